//! Govee H5075 advertisement decoder.
//!
//! The manufacturer payload (company id `0xEC88`, id bytes already stripped)
//! looks like this:
//!
//! ```text
//! byte 0      : flags (ignored)
//! bytes 1..=3 : big-endian 24-bit value; bit 23 is the sign of the temperature
//!               magnitude = temperature * 10 * 1000 + humidity * 10
//! byte 4      : battery percentage
//! ```
//!
//! The sign bit is cleared and then applied to the temperature only. This is
//! not two's complement; it is what the sensor actually sends.

use crate::reading::Reading;
use crate::registry::DeviceDescriptor;
use std::ops::RangeInclusive;
use thiserror::Error;

/// Shortest payload that carries a full reading.
pub const MIN_PAYLOAD_LEN: usize = 5;

/// Plausible raw sensor temperatures, in °C, before calibration.
pub const TEMPERATURE_RANGE: RangeInclusive<f64> = -40.0..=60.0;

/// Plausible raw relative humidity, in percent, before calibration.
pub const HUMIDITY_RANGE: RangeInclusive<f64> = 0.0..=100.0;

const SIGN_BIT: u32 = 0x80_0000;

/// Why an advertisement was discarded.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    #[error("malformed payload ({len} bytes, need at least {})", MIN_PAYLOAD_LEN)]
    MalformedPayload { len: usize },
    #[error("invalid zero reading")]
    InvalidZeroReading,
    #[error("temperature {0:.2}°C out of range")]
    OutOfRangeTemperature(f64),
    #[error("humidity {0:.2}% out of range")]
    OutOfRangeHumidity(f64),
}

/// Decode a manufacturer payload and apply the device's calibration.
///
/// Range checks run on the raw sensor values; offsets are added afterwards,
/// so a calibrated value may end up outside [`TEMPERATURE_RANGE`] or
/// [`HUMIDITY_RANGE`].
pub fn decode(payload: &[u8], device: &DeviceDescriptor) -> Result<Reading, Rejection> {
    let mut reading = decode_uncalibrated(payload)?;
    reading.temperature += device.offsets.temperature;
    reading.humidity += device.offsets.humidity;
    Ok(reading)
}

/// Decode and validate a payload without applying any calibration.
pub fn decode_uncalibrated(payload: &[u8]) -> Result<Reading, Rejection> {
    if payload.len() < MIN_PAYLOAD_LEN {
        return Err(Rejection::MalformedPayload { len: payload.len() });
    }

    if payload[1..=3].iter().all(|&b| b == 0) {
        return Err(Rejection::InvalidZeroReading);
    }

    let mut raw = u32::from_be_bytes([0, payload[1], payload[2], payload[3]]);
    let negative = raw & SIGN_BIT != 0;
    if negative {
        raw &= !SIGN_BIT;
    }

    let magnitude = f64::from(raw / 1000) / 10.0;
    let temperature = if negative { -magnitude } else { magnitude };
    let humidity = f64::from(raw % 1000) / 10.0;

    if !TEMPERATURE_RANGE.contains(&temperature) {
        return Err(Rejection::OutOfRangeTemperature(temperature));
    }
    if !HUMIDITY_RANGE.contains(&humidity) {
        return Err(Rejection::OutOfRangeHumidity(humidity));
    }

    Ok(Reading {
        temperature,
        humidity,
        battery: payload[4],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{descriptor, descriptor_with_offsets};

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_decode_positive_temperature() {
        let reading = decode(&[0x01, 0x01, 0x56, 0x32, 0x64], &descriptor("Test1")).unwrap();
        assert_close(reading.temperature, 8.7);
        assert_close(reading.humidity, 60.2);
        assert_eq!(reading.battery, 100);
    }

    #[test]
    fn test_decode_negative_temperature() {
        let reading = decode(&[0x01, 0x80, 0x04, 0x40, 0x32], &descriptor("Test2")).unwrap();
        assert_close(reading.temperature, -0.1);
        assert_close(reading.humidity, 8.8);
        assert_eq!(reading.battery, 50);
    }

    #[test]
    fn test_sign_bit_is_not_twos_complement() {
        // 0x8186A0 with the sign bit cleared is 100000 -> 10.0°C, 0.0%
        let reading = decode_uncalibrated(&[0x00, 0x81, 0x86, 0xA0, 0x10]).unwrap();
        assert_close(reading.temperature, -10.0);
        assert_close(reading.humidity, 0.0);
    }

    #[test]
    fn test_decode_applies_offsets() {
        let device = descriptor_with_offsets("Test3", 1.5, -2.0);
        let reading = decode(&[0x01, 0x01, 0x56, 0x32, 0x64], &device).unwrap();
        assert_close(reading.temperature, 10.2);
        assert_close(reading.humidity, 58.2);
        assert_eq!(reading.battery, 100);
    }

    #[test]
    fn test_offsets_applied_after_validation() {
        // 59.0°C is inside the sensor window; +5.0 pushes it past 60 and is kept
        let device = descriptor_with_offsets("Hot", 5.0, 0.0);
        let reading = decode(&[0x01, 0x09, 0x00, 0xB0, 0x64], &device).unwrap();
        assert_close(reading.temperature, 64.0);
    }

    #[test]
    fn test_reject_short_payload() {
        assert_eq!(
            decode(&[0x01, 0x02, 0x03], &descriptor("Test4")),
            Err(Rejection::MalformedPayload { len: 3 })
        );
        assert_eq!(
            decode(&[], &descriptor("Test4")),
            Err(Rejection::MalformedPayload { len: 0 })
        );
    }

    #[test]
    fn test_reject_zero_reading() {
        assert_eq!(
            decode(&[0x01, 0x00, 0x00, 0x00, 0x64], &descriptor("Test5")),
            Err(Rejection::InvalidZeroReading)
        );
    }

    #[test]
    fn test_reject_out_of_range_temperature() {
        // 650500 -> 65.0°C, 50.0%
        assert_eq!(
            decode(&[0x01, 0x09, 0xED, 0x04, 0x64], &descriptor("Test6")),
            Err(Rejection::OutOfRangeTemperature(65.0))
        );
        // sign bit + 410000 -> -41.0°C
        let result = decode_uncalibrated(&[0x01, 0x86, 0x41, 0x90, 0x64]);
        assert_eq!(result, Err(Rejection::OutOfRangeTemperature(-41.0)));
    }

    #[test]
    fn test_extra_bytes_are_ignored() {
        let reading = decode_uncalibrated(&[0x01, 0x01, 0x56, 0x32, 0x64, 0xFF, 0xFF]).unwrap();
        assert_close(reading.temperature, 8.7);
        assert_eq!(reading.battery, 100);
    }

    #[test]
    fn test_magnitude_round_trip() {
        // Every valid positive raw value is recovered from its decoded parts.
        for raw in (1u32..=600_999).step_by(997) {
            let bytes = raw.to_be_bytes();
            let reading = decode_uncalibrated(&[0x01, bytes[1], bytes[2], bytes[3], 0x64]).unwrap();
            let temp_component = (reading.temperature * 10.0).round() as u32;
            let hum_component = (reading.humidity * 10.0).round() as u32;
            assert_eq!(temp_component * 1000 + hum_component, raw, "raw {raw}");
        }
    }

    #[test]
    fn test_rejection_display() {
        assert_eq!(
            Rejection::MalformedPayload { len: 3 }.to_string(),
            "malformed payload (3 bytes, need at least 5)"
        );
        assert_eq!(
            Rejection::InvalidZeroReading.to_string(),
            "invalid zero reading"
        );
        assert_eq!(
            Rejection::OutOfRangeTemperature(65.0).to_string(),
            "temperature 65.00°C out of range"
        );
        assert_eq!(
            Rejection::OutOfRangeHumidity(101.5).to_string(),
            "humidity 101.50% out of range"
        );
    }
}
