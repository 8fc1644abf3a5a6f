//! Prometheus metrics for Govee sensors.
//!
//! Series layout:
//!
//! ```text
//! govee_h5075_temperature{name="Kitchen"} 21.3
//! govee_h5075_humidity{name="Kitchen"} 48.2
//! govee_h5075_battery{name="Kitchen"} 87
//! govee_device_status{name="Kitchen",status="active"} 1
//! govee_device_status{name="Kitchen",status="stale"} 0
//! govee_device_status{name="Kitchen",status="never_seen"} 0
//! openmeteo_temperature 11.8
//! openmeteo_humidity 95
//! ```

use crate::metrics::MetricsSink;
use crate::reading::Reading;
use crate::telemetry::DeviceStatus;
use ::prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};

pub const TEMPERATURE_METRIC: &str = "govee_h5075_temperature";
pub const HUMIDITY_METRIC: &str = "govee_h5075_humidity";
pub const BATTERY_METRIC: &str = "govee_h5075_battery";
pub const STATUS_METRIC: &str = "govee_device_status";
pub const WEATHER_TEMPERATURE_METRIC: &str = "openmeteo_temperature";
pub const WEATHER_HUMIDITY_METRIC: &str = "openmeteo_humidity";

/// Prometheus-backed [`MetricsSink`] with its own registry.
///
/// Owning the registry (instead of using the process-global default) keeps
/// test instances isolated from each other.
#[derive(Clone)]
pub struct PrometheusMetrics {
    registry: Registry,
    temperature: GaugeVec,
    humidity: GaugeVec,
    battery: GaugeVec,
    status: GaugeVec,
    // Label-less vectors so the series only appear after the first fetch.
    weather_temperature: GaugeVec,
    weather_humidity: GaugeVec,
}

impl PrometheusMetrics {
    pub fn new() -> Result<Self, ::prometheus::Error> {
        let registry = Registry::new();

        let temperature = GaugeVec::new(
            Opts::new(
                TEMPERATURE_METRIC,
                "Temperature readings from Govee H5075 sensors",
            ),
            &["name"],
        )?;
        let humidity = GaugeVec::new(
            Opts::new(HUMIDITY_METRIC, "Humidity readings from Govee H5075 sensors"),
            &["name"],
        )?;
        let battery = GaugeVec::new(
            Opts::new(BATTERY_METRIC, "Battery levels of Govee H5075 sensors"),
            &["name"],
        )?;
        let status = GaugeVec::new(
            Opts::new(
                STATUS_METRIC,
                "Device status (1 for the current status of each device)",
            ),
            &["name", "status"],
        )?;
        let weather_temperature = GaugeVec::new(
            Opts::new(
                WEATHER_TEMPERATURE_METRIC,
                "Outdoor temperature from Open-Meteo",
            ),
            &[],
        )?;
        let weather_humidity = GaugeVec::new(
            Opts::new(
                WEATHER_HUMIDITY_METRIC,
                "Outdoor relative humidity from Open-Meteo",
            ),
            &[],
        )?;

        registry.register(Box::new(temperature.clone()))?;
        registry.register(Box::new(humidity.clone()))?;
        registry.register(Box::new(battery.clone()))?;
        registry.register(Box::new(status.clone()))?;
        registry.register(Box::new(weather_temperature.clone()))?;
        registry.register(Box::new(weather_humidity.clone()))?;

        Ok(Self {
            registry,
            temperature,
            humidity,
            battery,
            status,
            weather_temperature,
            weather_humidity,
        })
    }

    /// Render every registered series in the Prometheus text format.
    pub fn encode(&self) -> Result<String, ::prometheus::Error> {
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| ::prometheus::Error::Msg(e.to_string()))
    }

    /// Current value of a series, or `None` if it is not exported.
    ///
    /// `labels` must list every label of the series.
    #[cfg(test)]
    pub(crate) fn value(&self, metric: &str, labels: &[(&str, &str)]) -> Option<f64> {
        self.registry
            .gather()
            .iter()
            .filter(|family| family.get_name() == metric)
            .flat_map(|family| family.get_metric())
            .find(|m| {
                let pairs = m.get_label();
                pairs.len() == labels.len()
                    && labels.iter().all(|(name, value)| {
                        pairs
                            .iter()
                            .any(|p| p.get_name() == *name && p.get_value() == *value)
                    })
            })
            .map(|m| m.get_gauge().get_value())
    }

    /// Whether any series of any metric carries `name="<name>"`.
    #[cfg(test)]
    pub(crate) fn has_series_for(&self, name: &str) -> bool {
        self.registry.gather().iter().any(|family| {
            family.get_metric().iter().any(|m| {
                m.get_label()
                    .iter()
                    .any(|p| p.get_name() == "name" && p.get_value() == name)
            })
        })
    }
}

impl MetricsSink for PrometheusMetrics {
    fn set_reading(&self, name: &str, reading: &Reading) {
        self.temperature
            .with_label_values(&[name])
            .set(reading.temperature);
        self.humidity.with_label_values(&[name]).set(reading.humidity);
        self.battery
            .with_label_values(&[name])
            .set(f64::from(reading.battery));
    }

    fn remove_reading(&self, name: &str) {
        // Missing series are fine: the device may never have reported.
        let _ = self.temperature.remove_label_values(&[name]);
        let _ = self.humidity.remove_label_values(&[name]);
        let _ = self.battery.remove_label_values(&[name]);
    }

    fn set_status(&self, name: &str, status: DeviceStatus) {
        for candidate in DeviceStatus::ALL {
            let value = if candidate == status { 1.0 } else { 0.0 };
            self.status
                .with_label_values(&[name, candidate.as_str()])
                .set(value);
        }
    }

    fn remove_device(&self, name: &str) {
        self.remove_reading(name);
        for status in DeviceStatus::ALL {
            let _ = self.status.remove_label_values(&[name, status.as_str()]);
        }
    }

    fn set_weather(&self, temperature: f64, humidity: f64) {
        self.weather_temperature.with_label_values(&[]).set(temperature);
        self.weather_humidity.with_label_values(&[]).set(humidity);
    }
}
