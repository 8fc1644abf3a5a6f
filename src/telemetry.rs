//! Telemetry state store.
//!
//! One [`TelemetryStore`] owns the device roster and the per-device state
//! behind a single mutex. Callers go through a narrow API:
//!
//! - [`TelemetryStore::update`] for a decoded reading (scan loop)
//! - [`TelemetryStore::sweep`] for status and staleness (sweeper)
//! - [`TelemetryStore::reconcile`] for a new roster (reload handler)
//!
//! The lock is only held for map operations and the matching metrics
//! updates, so a reader never sees a reading without its last-seen time or a
//! half-swapped roster. Logging happens after the lock is released.

use crate::mac_address::MacAddress;
use crate::metrics::MetricsSink;
use crate::reading::Reading;
use crate::registry::{DeviceDescriptor, DeviceRegistry};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Minimum change in temperature (°C) or humidity (%) that is logged again.
pub const LOG_EPSILON: f64 = 0.01;

/// Lifecycle of a device as seen by the exporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceStatus {
    /// Configured but no valid reading yet
    NeverSeen,
    /// Reported within the stale threshold
    Active,
    /// Stopped reporting; values are no longer exported
    Stale,
}

impl DeviceStatus {
    pub const ALL: [DeviceStatus; 3] = [
        DeviceStatus::Active,
        DeviceStatus::Stale,
        DeviceStatus::NeverSeen,
    ];

    /// Label value used on the status metric.
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceStatus::NeverSeen => "never_seen",
            DeviceStatus::Active => "active",
            DeviceStatus::Stale => "stale",
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-device state, keyed by display name.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    pub last_reading: Option<Reading>,
    pub last_seen: Option<Instant>,
    /// Last reading that produced a log line; only used for dedup.
    pub last_logged: Option<Reading>,
    pub status: DeviceStatus,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            last_reading: None,
            last_seen: None,
            last_logged: None,
            status: DeviceStatus::NeverSeen,
        }
    }
}

/// Counts produced by one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub active: usize,
    pub stale: usize,
    pub never_seen: usize,
    /// Devices that went from active to stale during this sweep
    pub newly_stale: Vec<String>,
}

struct Inner {
    registry: Arc<DeviceRegistry>,
    devices: HashMap<String, DeviceState>,
}

/// Shared registry plus per-device telemetry.
pub struct TelemetryStore {
    inner: Mutex<Inner>,
    metrics: Arc<dyn MetricsSink>,
}

impl TelemetryStore {
    pub fn new(registry: DeviceRegistry, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                registry: Arc::new(registry),
                devices: HashMap::new(),
            }),
            metrics,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Find the current descriptor for an address.
    pub fn lookup(&self, address: &MacAddress) -> Option<Arc<DeviceDescriptor>> {
        self.lock().registry.lookup(address).cloned()
    }

    /// Snapshot of the roster currently in use.
    pub fn registry(&self) -> Arc<DeviceRegistry> {
        Arc::clone(&self.lock().registry)
    }

    /// Snapshot of one device's state.
    pub fn device(&self, name: &str) -> Option<DeviceState> {
        self.lock().devices.get(name).cloned()
    }

    pub fn status(&self, name: &str) -> Option<DeviceStatus> {
        self.lock().devices.get(name).map(|state| state.status)
    }

    /// Record a validated reading for `device` at `now`.
    ///
    /// Exported values, last-seen and status are always updated. Returns
    /// whether the reading was logged, which only happens when it differs
    /// from the last logged one (see [`should_log`]).
    ///
    /// A descriptor that is no longer in the roster (a reload won the race
    /// against the scan loop) is ignored.
    pub fn update(&self, device: &DeviceDescriptor, reading: Reading, now: Instant) -> bool {
        let (logged, width) = {
            let mut inner = self.lock();
            let current = inner.registry.lookup(&device.address);
            if current.is_none_or(|d| d.display_name != device.display_name) {
                drop(inner);
                debug!(device = %device.display_name, "dropping reading for device no longer configured");
                return false;
            }
            let width = inner.registry.max_name_len();

            let state = inner
                .devices
                .entry(device.display_name.clone())
                .or_default();
            state.last_reading = Some(reading);
            state.last_seen = Some(now);
            state.status = DeviceStatus::Active;

            let logged = should_log(state.last_logged.as_ref(), &reading);
            if logged {
                state.last_logged = Some(reading);
            }

            self.metrics.set_reading(&device.display_name, &reading);
            self.metrics
                .set_status(&device.display_name, DeviceStatus::Active);
            (logged, width)
        };

        if logged {
            info!(
                "{:<width$} | Temp: {:5.2}°C | Humidity: {:5.2}% | Battery: {:3}%",
                device.display_name,
                reading.temperature,
                reading.humidity,
                reading.battery,
                width = width,
            );
        }
        logged
    }

    /// Recompute the status of every configured device.
    ///
    /// Devices silent for longer than `stale_threshold` lose their value
    /// series but stay tracked with status [`DeviceStatus::Stale`].
    pub fn sweep(&self, now: Instant, stale_threshold: Duration) -> SweepSummary {
        let mut summary = SweepSummary::default();
        let mut transitions = Vec::new();

        {
            let mut inner = self.lock();
            let Inner { registry, devices } = &mut *inner;

            for descriptor in registry.iter() {
                let name = &descriptor.display_name;
                let state = devices.entry(name.clone()).or_default();

                let status = match state.last_seen {
                    None => DeviceStatus::NeverSeen,
                    Some(last_seen) if now.duration_since(last_seen) > stale_threshold => {
                        self.metrics.remove_reading(name);
                        if state.status != DeviceStatus::Stale {
                            transitions.push((Arc::clone(descriptor), last_seen));
                        }
                        DeviceStatus::Stale
                    }
                    Some(_) => DeviceStatus::Active,
                };

                state.status = status;
                self.metrics.set_status(name, status);

                match status {
                    DeviceStatus::Active => summary.active += 1,
                    DeviceStatus::Stale => summary.stale += 1,
                    DeviceStatus::NeverSeen => summary.never_seen += 1,
                }
            }
        }

        for (descriptor, last_seen) in transitions {
            info!(
                device = %descriptor.display_name,
                address = %descriptor.address,
                silent_for = ?now.duration_since(last_seen),
                "metrics reset due to inactivity"
            );
            summary.newly_stale.push(descriptor.display_name.clone());
        }

        summary
    }

    /// Replace the roster, dropping every trace of devices that left it.
    ///
    /// Returns the display names that were removed. Devices present in both
    /// rosters keep their state untouched.
    pub fn reconcile(&self, registry: DeviceRegistry) -> Vec<String> {
        let mut removed: Vec<String> = {
            let mut inner = self.lock();

            let removed: Vec<String> = inner
                .registry
                .iter()
                .map(|d| d.display_name.clone())
                .filter(|name| !registry.contains_name(name))
                .collect();

            for name in &removed {
                self.metrics.remove_device(name);
                inner.devices.remove(name);
            }
            inner.registry = Arc::new(registry);
            removed
        };

        removed.sort();
        for name in &removed {
            info!(device = %name, "device removed from configuration, metrics deleted");
        }
        removed
    }
}

/// Whether `reading` differs enough from the last logged one to log again.
///
/// The first reading always logs. Temperature and humidity must move by at
/// least [`LOG_EPSILON`]; any battery change logs.
pub fn should_log(last_logged: Option<&Reading>, reading: &Reading) -> bool {
    match last_logged {
        None => true,
        Some(last) => {
            (reading.temperature - last.temperature).abs() >= LOG_EPSILON
                || (reading.humidity - last.humidity).abs() >= LOG_EPSILON
                || reading.battery != last.battery
        }
    }
}
