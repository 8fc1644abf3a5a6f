//! Outdoor reference weather.
//!
//! The poller runs beside the sensor pipeline and only ever touches the
//! `openmeteo_*` gauges. Its interval, location and enable flag come from the
//! live [`Settings`], so a reload can change them without a restart.

pub mod client;

pub use client::{CurrentWeather, OpenMeteoClient, WeatherError};

use crate::config::{Settings, WeatherSettings};
use crate::metrics::MetricsSink;
use crate::timer::Ticker;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub type WeatherFuture<'a> =
    Pin<Box<dyn Future<Output = Result<CurrentWeather, WeatherError>> + Send + 'a>>;

/// Remote source of current outdoor conditions.
pub trait WeatherSource: Send + Sync {
    fn current(&self, latitude: f64, longitude: f64) -> WeatherFuture<'_>;
}

impl WeatherSource for OpenMeteoClient {
    fn current(&self, latitude: f64, longitude: f64) -> WeatherFuture<'_> {
        Box::pin(self.current_weather(latitude, longitude))
    }
}

/// Fetch once and export the result. Failures are logged and leave the
/// previous values in place.
pub async fn poll_once(
    source: &dyn WeatherSource,
    metrics: &dyn MetricsSink,
    settings: &WeatherSettings,
) -> Option<CurrentWeather> {
    match source.current(settings.latitude, settings.longitude).await {
        Ok(weather) => {
            metrics.set_weather(weather.temperature, weather.humidity);
            info!(
                "Open-Meteo | Temp: {:5.2}°C | Humidity: {:5.2}%",
                weather.temperature, weather.humidity
            );
            Some(weather)
        }
        Err(e) => {
            warn!("failed to fetch Open-Meteo weather: {e}");
            None
        }
    }
}

/// Poll the weather source until `cancel` fires.
///
/// Polls immediately when enabled, then every configured interval. An
/// interval change re-arms the timer; enabling polling or moving the
/// location triggers a fetch right away.
pub async fn run_weather_poller(
    source: Arc<dyn WeatherSource>,
    metrics: Arc<dyn MetricsSink>,
    mut settings: watch::Receiver<Settings>,
    cancel: CancellationToken,
) {
    let mut current = settings.borrow_and_update().weather.clone();
    let mut ticker = Ticker::new(current.interval);
    let mut watching = true;

    if current.enabled {
        info!(
            interval = ?current.interval,
            latitude = current.latitude,
            longitude = current.longitude,
            "Open-Meteo polling enabled"
        );
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick(), if current.enabled => {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = poll_once(source.as_ref(), metrics.as_ref(), &current) => {}
                }
            }
            changed = settings.changed(), if watching => match changed {
                Ok(()) => {
                    let next = settings.borrow_and_update().weather.clone();
                    if next != current {
                        apply_change(&mut ticker, &current, &next);
                        current = next;
                    }
                }
                Err(_) => watching = false,
            },
        }
    }
    debug!("weather poller stopped");
}

fn apply_change(ticker: &mut Ticker, current: &WeatherSettings, next: &WeatherSettings) {
    if ticker.set_period(next.interval) {
        info!(interval = ?next.interval, "Open-Meteo poll interval changed");
    }

    match (current.enabled, next.enabled) {
        (false, true) => {
            info!(interval = ?next.interval, "Open-Meteo polling enabled");
            ticker.fire_now();
        }
        (true, false) => info!("Open-Meteo polling disabled"),
        (true, true)
            if current.latitude != next.latitude || current.longitude != next.longitude =>
        {
            info!(
                latitude = next.latitude,
                longitude = next.longitude,
                "Open-Meteo location changed"
            );
            ticker.fire_now();
        }
        _ => {}
    }
}
