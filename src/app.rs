//! Scan loop and staleness sweeper.
//!
//! Both tasks are decoupled from the real radio and from process-level
//! concerns, so they can be driven deterministically with a fake [`Radio`]
//! and a paused clock.

use crate::config::Settings;
use crate::decoder::{self, Rejection};
use crate::scanner::{
    ADVERTISEMENT_CHANNEL_BUFFER_SIZE, Advertisement, GOVEE_MANUFACTURER_ID, Radio, ScanError,
};
use crate::telemetry::TelemetryStore;
use crate::timer::Ticker;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How many times the adapter is powered on before giving up.
pub const ENABLE_ATTEMPTS: u32 = 3;
/// Pause between adapter enable attempts.
pub const ENABLE_BACKOFF: Duration = Duration::from_secs(2);
/// Pause after a failed scan window before the next one.
pub const SCAN_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Errors that end a long-running task.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("failed to enable Bluetooth adapter after {attempts} attempts: {source}")]
    Enable {
        attempts: u32,
        #[source]
        source: ScanError,
    },
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// What happened to one advertisement.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Unknown address or no Govee payload
    Ignored,
    /// Known device, payload discarded by the decoder
    Rejected(Rejection),
    /// Reading stored; `logged` tells whether it produced a log line
    Stored { logged: bool },
}

/// Filter, decode and store a single advertisement.
pub fn process_advertisement(
    store: &TelemetryStore,
    adv: &Advertisement,
    now: Instant,
) -> Outcome {
    let Some(payload) = adv.vendor_payload(GOVEE_MANUFACTURER_ID) else {
        return Outcome::Ignored;
    };
    let Some(device) = store.lookup(&adv.address) else {
        return Outcome::Ignored;
    };

    match decoder::decode(payload, &device) {
        Ok(reading) => Outcome::Stored {
            logged: store.update(&device, reading, now),
        },
        Err(rejection) => {
            warn!(
                device = %device.display_name,
                address = %adv.address,
                reason = %rejection,
                "ignoring advertisement"
            );
            Outcome::Rejected(rejection)
        }
    }
}

/// Power on the radio, retrying with a fixed backoff.
pub async fn enable_radio(radio: &dyn Radio) -> Result<(), RunError> {
    let mut attempt = 1;
    loop {
        match radio.enable().await {
            Ok(()) => return Ok(()),
            Err(source) if attempt >= ENABLE_ATTEMPTS => {
                return Err(RunError::Enable {
                    attempts: ENABLE_ATTEMPTS,
                    source,
                });
            }
            Err(e) => {
                warn!(
                    "failed to enable Bluetooth adapter (attempt {attempt}/{ENABLE_ATTEMPTS}): {e}"
                );
                sleep(ENABLE_BACKOFF).await;
                attempt += 1;
            }
        }
    }
}

/// Run the scan loop until `cancel` fires.
///
/// The radio pushes advertisements into a bounded channel; a single ingest
/// future drains it, so updates for one device are applied in order. Scan
/// windows alternate with rest periods, both taken from the latest
/// `settings`. A failed window is retried after [`SCAN_RETRY_DELAY`].
///
/// Only a radio that cannot be enabled is fatal.
pub async fn run_scan_loop(
    radio: Arc<dyn Radio>,
    store: Arc<TelemetryStore>,
    settings: watch::Receiver<Settings>,
    cancel: CancellationToken,
) -> Result<(), RunError> {
    tokio::select! {
        _ = cancel.cancelled() => return Ok(()),
        enabled = enable_radio(radio.as_ref()) => enabled?,
    }
    info!("scanning for Govee H5075 devices");

    let (tx, mut rx) = mpsc::channel(ADVERTISEMENT_CHANNEL_BUFFER_SIZE);

    let ingest = async {
        while let Some(adv) = rx.recv().await {
            process_advertisement(&store, &adv, Instant::now());
        }
    };

    tokio::join!(scan_cycles(radio.as_ref(), tx, settings, &cancel), ingest);
    debug!("scan loop stopped");
    Ok(())
}

async fn scan_cycles(
    radio: &dyn Radio,
    tx: mpsc::Sender<Advertisement>,
    settings: watch::Receiver<Settings>,
    cancel: &CancellationToken,
) {
    loop {
        let (interval, duration) = {
            let s = settings.borrow();
            (s.scan_interval, s.scan_duration)
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = radio.scan(duration, tx.clone()) => result,
        };

        let rest = match result {
            Ok(()) => {
                info!("Scan completed. Sleeping for {interval:?} until next scan...");
                interval
            }
            Err(e) => {
                warn!("scanning failed, retrying in {SCAN_RETRY_DELAY:?}: {e}");
                SCAN_RETRY_DELAY
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep(rest) => {}
        }
    }
}

/// Periodically recompute device status and drop stale values.
///
/// Sweeps once at startup so configured devices report `never_seen` right
/// away, then every refresh interval. A reload that changes the refresh
/// interval re-arms the timer; the stale threshold is read on every sweep.
pub async fn run_sweeper(
    store: Arc<TelemetryStore>,
    mut settings: watch::Receiver<Settings>,
    cancel: CancellationToken,
) {
    let mut ticker = Ticker::new(settings.borrow_and_update().refresh_interval);
    let mut watching = true;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let threshold = settings.borrow().stale_threshold;
                let summary = store.sweep(Instant::now(), threshold);
                debug!(
                    active = summary.active,
                    stale = summary.stale,
                    never_seen = summary.never_seen,
                    "status sweep"
                );
            }
            changed = settings.changed(), if watching => match changed {
                Ok(()) => {
                    let refresh = settings.borrow_and_update().refresh_interval;
                    if ticker.set_period(refresh) {
                        info!(interval = ?refresh, "refresh interval changed");
                    }
                }
                Err(_) => watching = false,
            },
        }
    }
    debug!("sweeper stopped");
}
