//! Configuration file and environment handling.
//!
//! The file (`config.yaml`) is the only durable input. Values are layered as
//! defaults, then the file, then environment variables. Duration strings are
//! parsed exactly once per load into [`Settings`], so long-running tasks only
//! compare typed values when a reload arrives.

use crate::duration::parse_or_default;
use serde::{Deserialize, Deserializer, de};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_SCAN_INTERVAL: &str = "15s";
pub const DEFAULT_SCAN_DURATION: &str = "15s";
pub const DEFAULT_REFRESH_INTERVAL: &str = "30s";
pub const DEFAULT_STALE_THRESHOLD: &str = "5m";
pub const DEFAULT_WEATHER_INTERVAL: &str = "15m";

/// Errors returned while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },
}

/// Raw file contents, before durations are interpreted.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileConfig {
    pub server: ServerSection,
    pub bluetooth: BluetoothSection,
    pub metrics: MetricsSection,
    pub openmeteo: OpenMeteoSection,
    pub devices: Vec<DeviceConfig>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerSection {
    #[serde(deserialize_with = "scalar_string")]
    pub port: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct BluetoothSection {
    #[serde(deserialize_with = "scalar_string")]
    pub scan_interval: String,
    #[serde(deserialize_with = "scalar_string")]
    pub scan_duration: String,
}

impl Default for BluetoothSection {
    fn default() -> Self {
        Self {
            scan_interval: DEFAULT_SCAN_INTERVAL.to_string(),
            scan_duration: DEFAULT_SCAN_DURATION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct MetricsSection {
    #[serde(deserialize_with = "scalar_string")]
    pub refresh_interval: String,
    #[serde(deserialize_with = "scalar_string")]
    pub stale_threshold: String,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL.to_string(),
            stale_threshold: DEFAULT_STALE_THRESHOLD.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct OpenMeteoSection {
    pub enabled: bool,
    #[serde(deserialize_with = "scalar_string")]
    pub interval: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Default for OpenMeteoSection {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: DEFAULT_WEATHER_INTERVAL.to_string(),
            latitude: 0.0,
            longitude: 0.0,
        }
    }
}

/// Accept `port: 8080` as well as `port: "8080"`, `scanInterval: 30` as
/// well as `scanInterval: 30s`.
fn scalar_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_yaml::Value::deserialize(deserializer)? {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!(
            "expected a string or number, found {other:?}"
        ))),
    }
}

/// One roster entry as written in the configuration file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct DeviceConfig {
    pub mac: String,
    pub name: String,
    pub display_name: Option<String>,
    pub group: Option<String>,
    pub offsets: Offsets,
}

/// Additive calibration offsets.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Offsets {
    pub temperature: f64,
    pub humidity: f64,
}

/// Typed runtime settings derived from a [`FileConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub port: u16,
    pub scan_interval: Duration,
    pub scan_duration: Duration,
    pub refresh_interval: Duration,
    pub stale_threshold: Duration,
    pub weather: WeatherSettings,
}

/// External reference-data settings.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherSettings {
    pub enabled: bool,
    pub interval: Duration,
    pub latitude: f64,
    pub longitude: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            port: DEFAULT_PORT,
            scan_interval: Duration::from_secs(15),
            scan_duration: Duration::from_secs(15),
            refresh_interval: Duration::from_secs(30),
            stale_threshold: Duration::from_secs(300),
            weather: WeatherSettings {
                enabled: false,
                interval: Duration::from_secs(900),
                latitude: 0.0,
                longitude: 0.0,
            },
        }
    }
}

impl Settings {
    /// Interpret the raw file values. Durations never fail (they fall back
    /// with a warning); an unusable port does.
    pub fn from_file(file: &FileConfig) -> Result<Self, ConfigError> {
        let port = file
            .server
            .port
            .trim()
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidValue {
                key: "server.port",
                value: file.server.port.clone(),
            })?;

        Ok(Settings {
            port,
            scan_interval: parse_or_default("bluetooth.scanInterval", &file.bluetooth.scan_interval),
            scan_duration: parse_or_default("bluetooth.scanDuration", &file.bluetooth.scan_duration),
            refresh_interval: parse_or_default(
                "metrics.refreshInterval",
                &file.metrics.refresh_interval,
            ),
            stale_threshold: parse_or_default(
                "metrics.staleThreshold",
                &file.metrics.stale_threshold,
            ),
            weather: WeatherSettings {
                enabled: file.openmeteo.enabled,
                interval: parse_or_default("openmeteo.interval", &file.openmeteo.interval),
                latitude: file.openmeteo.latitude,
                longitude: file.openmeteo.longitude,
            },
        })
    }
}

/// Where an effective setting came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Default,
    File,
    Environment,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Source::Default => "default",
            Source::File => "config file",
            Source::Environment => "environment",
        })
    }
}

/// One effective setting, as written, and its [`Source`].
#[derive(Debug, Clone, PartialEq)]
pub struct Origin {
    pub key: &'static str,
    pub value: String,
    pub source: Source,
}

type Accessor = fn(&FileConfig) -> String;

/// Settings whose origin is reported: file key, overriding variable and the
/// effective value.
const TRACKED: [(&str, Option<&str>, Accessor); 10] = [
    ("server.port", Some("PORT"), |f| f.server.port.clone()),
    ("bluetooth.scanInterval", Some("SCAN_INTERVAL"), |f| {
        f.bluetooth.scan_interval.clone()
    }),
    ("bluetooth.scanDuration", Some("SCAN_DURATION"), |f| {
        f.bluetooth.scan_duration.clone()
    }),
    ("metrics.refreshInterval", Some("REFRESH_INTERVAL"), |f| {
        f.metrics.refresh_interval.clone()
    }),
    ("metrics.staleThreshold", Some("STALE_THRESHOLD"), |f| {
        f.metrics.stale_threshold.clone()
    }),
    ("openmeteo.enabled", Some("OPENMETEO_ENABLED"), |f| {
        f.openmeteo.enabled.to_string()
    }),
    ("openmeteo.interval", Some("OPENMETEO_INTERVAL"), |f| {
        f.openmeteo.interval.clone()
    }),
    ("openmeteo.latitude", Some("OPENMETEO_LATITUDE"), |f| {
        f.openmeteo.latitude.to_string()
    }),
    ("openmeteo.longitude", Some("OPENMETEO_LONGITUDE"), |f| {
        f.openmeteo.longitude.to_string()
    }),
    ("devices", None, |f| format!("{} devices", f.devices.len())),
];

/// Whether the dotted `key` is set (and not null) in the parsed document.
fn in_document(document: &serde_yaml::Value, key: &str) -> bool {
    key.split('.')
        .try_fold(document, |node, part| node.get(part))
        .is_some_and(|value| !value.is_null())
}

/// A fully loaded configuration: typed settings plus the raw device roster.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub settings: Settings,
    pub devices: Vec<DeviceConfig>,
    /// Origin of every reported setting, in a fixed order
    pub origins: Vec<Origin>,
}

impl Config {
    /// Load `path`, applying process environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// Load `path`, reading overrides through `env`.
    ///
    /// A missing file is not an error: defaults (and an empty roster) are
    /// used so the exporter still serves its endpoints.
    pub fn load_with_env<F>(path: &Path, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "config file not found, using defaults and environment");
                String::new()
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::from_text(path, &text, env)
    }

    /// Re-read `path` after a change notification.
    ///
    /// Unlike [`Config::load`], a missing file is an error here: a file that
    /// vanished must not wipe the running roster.
    pub async fn reload(path: &Path) -> Result<Self, ConfigError> {
        Self::reload_with_env(path, |key| std::env::var(key).ok()).await
    }

    pub async fn reload_with_env<F>(path: &Path, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_text(path, &text, env)
    }

    /// Build a configuration from the contents of `path`. Blank text means
    /// defaults.
    fn from_text<F>(path: &Path, text: &str, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse_error = |source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        };

        let document: serde_yaml::Value = if text.trim().is_empty() {
            serde_yaml::Value::Null
        } else {
            serde_yaml::from_str(text).map_err(parse_error)?
        };
        let mut file: FileConfig = if document.is_null() {
            FileConfig::default()
        } else {
            serde_yaml::from_value(document.clone()).map_err(parse_error)?
        };

        apply_env(&mut file, &env)?;

        let origins = TRACKED
            .iter()
            .map(|&(key, variable, value)| {
                let source = if variable.is_some_and(|v| env(v).is_some_and(|s| !s.is_empty())) {
                    Source::Environment
                } else if in_document(&document, key) {
                    Source::File
                } else {
                    Source::Default
                };
                Origin {
                    key,
                    value: value(&file),
                    source,
                }
            })
            .collect();

        Ok(Config {
            settings: Settings::from_file(&file)?,
            devices: file.devices,
            origins,
        })
    }

    /// Log the effective settings once at startup or after a reload.
    pub fn log_summary(&self) {
        let s = &self.settings;
        info!(
            port = s.port,
            scan_duration = ?s.scan_duration,
            scan_interval = ?s.scan_interval,
            refresh_interval = ?s.refresh_interval,
            stale_threshold = ?s.stale_threshold,
            weather_enabled = s.weather.enabled,
            weather_interval = ?s.weather.interval,
            devices = self.devices.len(),
            "configuration loaded"
        );
        for origin in &self.origins {
            info!(
                setting = origin.key,
                value = %origin.value,
                source = %origin.source,
                "configuration value"
            );
        }
    }
}

fn apply_env<F>(file: &mut FileConfig, env: &F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let string_overrides: [(&str, &mut String); 6] = [
        ("PORT", &mut file.server.port),
        ("SCAN_INTERVAL", &mut file.bluetooth.scan_interval),
        ("SCAN_DURATION", &mut file.bluetooth.scan_duration),
        ("REFRESH_INTERVAL", &mut file.metrics.refresh_interval),
        ("STALE_THRESHOLD", &mut file.metrics.stale_threshold),
        ("OPENMETEO_INTERVAL", &mut file.openmeteo.interval),
    ];
    for (key, slot) in string_overrides {
        if let Some(value) = env(key).filter(|v| !v.is_empty()) {
            *slot = value;
        }
    }

    if let Some(value) = env("OPENMETEO_ENABLED").filter(|v| !v.is_empty()) {
        file.openmeteo.enabled = match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => {
                return Err(ConfigError::InvalidValue {
                    key: "OPENMETEO_ENABLED",
                    value,
                });
            }
        };
    }

    let float_overrides: [(&'static str, &mut f64); 2] = [
        ("OPENMETEO_LATITUDE", &mut file.openmeteo.latitude),
        ("OPENMETEO_LONGITUDE", &mut file.openmeteo.longitude),
    ];
    for (key, slot) in float_overrides {
        if let Some(value) = env(key).filter(|v| !v.is_empty()) {
            *slot = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue { key, value })?;
        }
    }

    Ok(())
}
