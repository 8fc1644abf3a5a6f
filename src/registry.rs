//! Device roster: the set of known sensors and their calibration.
//!
//! A [`DeviceRegistry`] is built wholesale from the configured device list and
//! never mutated afterwards. Reloading produces a new registry which the
//! telemetry store swaps in as a whole.

use crate::config::{DeviceConfig, Offsets};
use crate::mac_address::{MacAddress, ParseMacError};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Identity and calibration of one configured sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceDescriptor {
    /// Canonical hardware address
    pub address: MacAddress,
    /// Configured short name
    pub name: String,
    /// Name used as the metrics label; defaults to `name`
    pub display_name: String,
    /// Optional grouping (e.g. "Upstairs", "Outdoor")
    pub group: Option<String>,
    /// Additive calibration applied after validation
    pub offsets: Offsets,
}

/// Why a configured device entry was left out of the roster.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Diagnostic {
    #[error("device #{index} ('{name}') has no MAC address, skipping")]
    MissingAddress { index: usize, name: String },
    #[error("device #{index} ({address}) has no name, skipping")]
    MissingName { index: usize, address: String },
    #[error("device #{index} has an invalid MAC address '{address}': {source}")]
    InvalidAddress {
        index: usize,
        address: String,
        #[source]
        source: ParseMacError,
    },
    #[error("device #{index} repeats address {address}, keeping the first entry")]
    DuplicateAddress { index: usize, address: MacAddress },
    #[error("device #{index} repeats display name '{name}', keeping the first entry")]
    DuplicateName { index: usize, name: String },
}

/// Immutable mapping from hardware address to descriptor.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: HashMap<MacAddress, Arc<DeviceDescriptor>>,
    max_name_len: usize,
}

impl DeviceRegistry {
    /// Build a roster from configuration entries.
    ///
    /// Invalid entries are skipped and reported as diagnostics; loading
    /// itself never fails.
    pub fn load(entries: &[DeviceConfig]) -> (Self, Vec<Diagnostic>) {
        let mut devices: HashMap<MacAddress, Arc<DeviceDescriptor>> = HashMap::new();
        let mut diagnostics = Vec::new();

        for (index, entry) in entries.iter().enumerate() {
            let mac = entry.mac.trim();
            let name = entry.name.trim();

            if mac.is_empty() {
                diagnostics.push(Diagnostic::MissingAddress {
                    index,
                    name: name.to_string(),
                });
                continue;
            }
            if name.is_empty() {
                diagnostics.push(Diagnostic::MissingName {
                    index,
                    address: mac.to_string(),
                });
                continue;
            }

            let address: MacAddress = match mac.parse() {
                Ok(address) => address,
                Err(source) => {
                    diagnostics.push(Diagnostic::InvalidAddress {
                        index,
                        address: mac.to_string(),
                        source,
                    });
                    continue;
                }
            };

            let display_name = entry
                .display_name
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .unwrap_or(name)
                .to_string();

            if devices.contains_key(&address) {
                diagnostics.push(Diagnostic::DuplicateAddress { index, address });
                continue;
            }
            if devices.values().any(|d| d.display_name == display_name) {
                diagnostics.push(Diagnostic::DuplicateName {
                    index,
                    name: display_name,
                });
                continue;
            }

            devices.insert(
                address,
                Arc::new(DeviceDescriptor {
                    address,
                    name: name.to_string(),
                    display_name,
                    group: entry.group.clone().filter(|g| !g.trim().is_empty()),
                    offsets: entry.offsets,
                }),
            );
        }

        let max_name_len = devices
            .values()
            .map(|d| d.display_name.chars().count())
            .max()
            .unwrap_or(0);

        (
            DeviceRegistry {
                devices,
                max_name_len,
            },
            diagnostics,
        )
    }

    /// Find the descriptor for a hardware address.
    pub fn lookup(&self, address: &MacAddress) -> Option<&Arc<DeviceDescriptor>> {
        self.devices.get(address)
    }

    /// Whether any device in the roster uses `display_name` as its label.
    pub fn contains_name(&self, display_name: &str) -> bool {
        self.devices
            .values()
            .any(|d| d.display_name == display_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<DeviceDescriptor>> {
        self.devices.values()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Width of the longest display name, used to align reading log lines.
    pub fn max_name_len(&self) -> usize {
        self.max_name_len
    }

    /// Log the roster, one device per line, sorted by address.
    pub fn log_roster(&self) {
        if self.devices.is_empty() {
            warn!("no devices configured, nothing will be monitored");
            return;
        }

        let mut devices: Vec<_> = self.devices.values().collect();
        devices.sort_by_key(|d| d.address);

        info!("loaded {} known Govee H5075 devices", devices.len());
        for d in devices {
            info!(
                "  {} -> {:<width$} group: {:<12} temp offset: {:4.1}°C  humidity offset: {:4.1}%",
                d.address,
                d.display_name,
                d.group.as_deref().unwrap_or("-"),
                d.offsets.temperature,
                d.offsets.humidity,
                width = self.max_name_len,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(mac: &str, name: &str) -> DeviceConfig {
        DeviceConfig {
            mac: mac.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_load_skips_invalid_entries() {
        let entries = vec![
            DeviceConfig {
                group: Some("Downstairs".to_string()),
                offsets: Offsets {
                    temperature: 1.5,
                    humidity: -2.0,
                },
                ..entry("A4:C1:38:12:34:56", "Living_Room")
            },
            DeviceConfig {
                group: Some("Upstairs".to_string()),
                offsets: Offsets {
                    temperature: -0.5,
                    humidity: 1.0,
                },
                ..entry("b4:c1:38:12:34:57", "Bedroom")
            },
            entry("", "Invalid"),
            entry("C4:C1:38:12:34:58", ""),
        ];

        let (registry, diagnostics) = DeviceRegistry::load(&entries);

        assert_eq!(registry.len(), 2);
        assert_eq!(diagnostics.len(), 2);
        assert!(matches!(
            diagnostics[0],
            Diagnostic::MissingAddress { index: 2, .. }
        ));
        assert!(matches!(diagnostics[1], Diagnostic::MissingName { index: 3, .. }));

        let living = registry
            .lookup(&"A4:C1:38:12:34:56".parse().unwrap())
            .unwrap();
        assert_eq!(living.name, "Living_Room");
        assert_eq!(living.group.as_deref(), Some("Downstairs"));
        assert_eq!(living.offsets.temperature, 1.5);
        assert_eq!(living.offsets.humidity, -2.0);

        // lowercase configuration resolves under the canonical uppercase form
        let bedroom = registry
            .lookup(&"B4:C1:38:12:34:57".parse().unwrap())
            .unwrap();
        assert_eq!(bedroom.address.to_string(), "B4:C1:38:12:34:57");
        assert_eq!(bedroom.offsets.temperature, -0.5);
    }

    #[test]
    fn test_display_name_defaults_to_name() {
        let entries = vec![
            DeviceConfig {
                display_name: Some("Basement (North)".to_string()),
                ..entry("AA:BB:CC:DD:EE:01", "Basement")
            },
            entry("AA:BB:CC:DD:EE:02", "Garage"),
        ];

        let (registry, diagnostics) = DeviceRegistry::load(&entries);
        assert!(diagnostics.is_empty());

        let first = registry
            .lookup(&"AA:BB:CC:DD:EE:01".parse().unwrap())
            .unwrap();
        let second = registry
            .lookup(&"AA:BB:CC:DD:EE:02".parse().unwrap())
            .unwrap();
        assert_eq!(first.display_name, "Basement (North)");
        assert_eq!(second.display_name, "Garage");
        assert_eq!(registry.max_name_len(), "Basement (North)".len());
    }

    #[test]
    fn test_invalid_address_is_diagnosed() {
        let (registry, diagnostics) = DeviceRegistry::load(&[entry("not-a-mac", "Attic")]);
        assert!(registry.is_empty());
        assert!(matches!(
            diagnostics[0],
            Diagnostic::InvalidAddress { index: 0, .. }
        ));
    }

    #[test]
    fn test_duplicates_keep_first_entry() {
        let (registry, diagnostics) = DeviceRegistry::load(&[
            entry("AA:BB:CC:DD:EE:01", "Kitchen"),
            entry("aa:bb:cc:dd:ee:01", "Pantry"),
            entry("AA:BB:CC:DD:EE:02", "Kitchen"),
        ]);

        assert_eq!(registry.len(), 1);
        assert!(registry.contains_name("Kitchen"));
        assert!(!registry.contains_name("Pantry"));
        assert!(matches!(
            diagnostics[0],
            Diagnostic::DuplicateAddress { index: 1, .. }
        ));
        assert!(matches!(
            diagnostics[1],
            Diagnostic::DuplicateName { index: 2, .. }
        ));
    }

    #[test]
    fn test_lookup_unknown_address() {
        let (registry, _) = DeviceRegistry::load(&[entry("AA:BB:CC:DD:EE:01", "Kitchen")]);
        assert!(
            registry
                .lookup(&"11:22:33:44:55:66".parse().unwrap())
                .is_none()
        );
    }
}
