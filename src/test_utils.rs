use crate::config::{DeviceConfig, Offsets};
use crate::mac_address::MacAddress;
use crate::registry::{DeviceDescriptor, DeviceRegistry};

/// A stable MAC address for unit tests.
pub const TEST_MAC: MacAddress = MacAddress([0xA4, 0xC1, 0x38, 0xAA, 0xBB, 0xCC]);

/// Build a descriptor with no calibration.
pub fn descriptor(name: &str) -> DeviceDescriptor {
    descriptor_with_offsets(name, 0.0, 0.0)
}

/// Build a descriptor with the given temperature and humidity offsets.
pub fn descriptor_with_offsets(name: &str, temperature: f64, humidity: f64) -> DeviceDescriptor {
    DeviceDescriptor {
        address: TEST_MAC,
        name: name.to_string(),
        display_name: name.to_string(),
        group: None,
        offsets: Offsets {
            temperature,
            humidity,
        },
    }
}

/// Configuration entries for `(mac, name)` pairs.
pub fn device_configs(devices: &[(&str, &str)]) -> Vec<DeviceConfig> {
    devices
        .iter()
        .map(|(mac, name)| DeviceConfig {
            mac: mac.to_string(),
            name: name.to_string(),
            ..Default::default()
        })
        .collect()
}

/// A registry containing `(mac, name)` pairs, panicking on diagnostics.
pub fn registry(devices: &[(&str, &str)]) -> DeviceRegistry {
    let (registry, diagnostics) = DeviceRegistry::load(&device_configs(devices));
    assert!(diagnostics.is_empty(), "unexpected diagnostics: {diagnostics:?}");
    registry
}
