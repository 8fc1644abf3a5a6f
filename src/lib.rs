//! `govee-exporter` library.
//!
//! The binary (`src/main.rs`) is responsible for CLI parsing, task wiring and
//! process exit codes. The core logic (decoding, telemetry state, scan loop,
//! reload and weather polling) lives here where it can be tested
//! deterministically with a fake radio and a paused clock.

pub mod app;
pub mod config;
pub mod decoder;
pub mod duration;
pub mod logging;
pub mod mac_address;
pub mod metrics;
pub mod reading;
pub mod registry;
pub mod reload;
pub mod scanner;
pub mod server;
pub mod telemetry;
pub mod timer;
pub mod weather;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types at the crate root
pub use config::{Config, Settings, Source};
pub use decoder::{Rejection, decode};
pub use duration::parse_duration;
pub use mac_address::MacAddress;
pub use metrics::MetricsSink;
pub use metrics::prometheus::PrometheusMetrics;
pub use reading::Reading;
pub use registry::{DeviceDescriptor, DeviceRegistry};
pub use scanner::{Advertisement, Backend, Radio, ScanError};
pub use telemetry::{DeviceStatus, TelemetryStore};
