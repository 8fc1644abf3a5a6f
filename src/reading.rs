//! Sensor reading data structure.

/// One validated, calibrated reading from a Govee H5075.
///
/// A reading carries no timestamp; the telemetry store stamps it on arrival.
/// - Temperature in Celsius
/// - Relative humidity in percent
/// - Battery level in percent (0-100, as reported by the sensor)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub temperature: f64,
    pub humidity: f64,
    pub battery: u8,
}

impl Reading {
    pub fn new(temperature: f64, humidity: f64, battery: u8) -> Self {
        Self {
            temperature,
            humidity,
            battery,
        }
    }
}
