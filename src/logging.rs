//! Logging initialization.
//!
//! Everything goes to stdout, where systemd or docker pick it up:
//! - **compact** (default): one human-readable line per event, reading lines
//!   included
//! - **json**: one JSON object per event for log shippers

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable consulted when `RUST_LOG` is not set.
pub const LOG_LEVEL_ENV: &str = "GOVEE_LOG_LEVEL";

/// Output format of the stdout log layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Build the filter: `RUST_LOG`, then `GOVEE_LOG_LEVEL`, then `info`.
/// `verbose` forces `debug` regardless of the environment.
pub fn env_filter(verbose: bool) -> anyhow::Result<EnvFilter> {
    if verbose {
        return Ok(EnvFilter::try_new("debug")?);
    }
    let log_level = std::env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| "info".to_string());
    Ok(EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log_level))?)
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns an error if the env filter cannot be parsed or a subscriber is
/// already installed.
pub fn init(format: LogFormat, verbose: bool) -> anyhow::Result<()> {
    let env_filter = env_filter(verbose)?;
    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Compact => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false),
            )
            .try_init()?,
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(false),
            )
            .try_init()?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_forces_debug() {
        let filter = env_filter(true).unwrap();
        assert_eq!(filter.to_string(), "debug");
    }

    #[test]
    fn test_log_format_default_is_compact() {
        assert_eq!(LogFormat::default(), LogFormat::Compact);
    }
}
