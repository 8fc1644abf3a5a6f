//! Metrics provider for sensor telemetry.
//!
//! The telemetry store pushes values through the [`MetricsSink`] trait; the
//! scrape endpoint reads them back from the concrete implementation. The only
//! implementation today is the Prometheus registry in [`prometheus`].

pub mod prometheus;

use crate::reading::Reading;
use crate::telemetry::DeviceStatus;

/// Keyed gauge sink for device readings, device status and reference weather.
///
/// Every method is keyed by the device display name. Implementations must be
/// safe to call from several tasks at once.
pub trait MetricsSink: Send + Sync {
    /// Set the temperature, humidity and battery series for a device.
    fn set_reading(&self, name: &str, reading: &Reading);

    /// Remove the temperature, humidity and battery series for a device.
    fn remove_reading(&self, name: &str);

    /// Set the status series so exactly one status reports 1.
    fn set_status(&self, name: &str, status: DeviceStatus);

    /// Remove every series (values and all status labels) for a device.
    fn remove_device(&self, name: &str);

    /// Set the outdoor reference temperature and humidity.
    fn set_weather(&self, temperature: f64, humidity: f64);
}
