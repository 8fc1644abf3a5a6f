//! Configuration change detection and the registry reload handler.
//!
//! [`watch_file`] polls the configuration file's contents and emits an event
//! whenever they change. [`run_reload_handler`] waits for events to settle for
//! [`DEBOUNCE`] and then reloads once, so an editor writing the file in
//! several steps triggers a single reload.

use crate::config::{Config, ConfigError, Settings};
use crate::registry::DeviceRegistry;
use crate::telemetry::TelemetryStore;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, MissedTickBehavior, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Quiet period after the last change before a reload runs.
pub const DEBOUNCE: Duration = Duration::from_millis(500);

/// How often the configuration file is checked.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Hash of the file contents; `None` when the file cannot be read.
///
/// Hashing the contents catches a same-size rewrite within one tick of a
/// coarse modification clock. Touching the file without changing it is not
/// a change.
type Fingerprint = Option<u64>;

async fn fingerprint(path: &Path) -> Fingerprint {
    let contents = tokio::fs::read(path).await.ok()?;
    let mut hasher = DefaultHasher::new();
    contents.hash(&mut hasher);
    Some(hasher.finish())
}

/// Send an event on `tx` every time `path` changes, until `cancel` fires or
/// the receiver goes away.
///
/// Creation and deletion count as changes too; the reload itself decides
/// what to make of them.
pub async fn watch_file(
    path: PathBuf,
    poll_interval: Duration,
    tx: mpsc::Sender<()>,
    cancel: CancellationToken,
) {
    let mut last = fingerprint(&path).await;
    let mut interval = time::interval(poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let current = fingerprint(&path).await;
                if current != last {
                    debug!(path = %path.display(), "configuration file changed");
                    last = current;
                    if tx.send(()).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
}

/// Result of one successful reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadSummary {
    /// Devices in the new roster
    pub devices: usize,
    /// Display names dropped from the roster, sorted
    pub removed: Vec<String>,
    /// Whether the typed settings differ from the previous ones
    pub settings_changed: bool,
}

/// Applies a re-read configuration to the running exporter.
pub struct Reloader {
    path: PathBuf,
    store: Arc<TelemetryStore>,
    settings: watch::Sender<Settings>,
    env: fn(&str) -> Option<String>,
}

fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

impl Reloader {
    pub fn new(
        path: PathBuf,
        store: Arc<TelemetryStore>,
        settings: watch::Sender<Settings>,
    ) -> Self {
        Self {
            path,
            store,
            settings,
            env: process_env,
        }
    }

    /// Read environment overrides through `env` instead of the process
    /// environment.
    pub fn with_env(mut self, env: fn(&str) -> Option<String>) -> Self {
        self.env = env;
        self
    }

    /// Re-read the configuration file and apply it.
    ///
    /// On error nothing is changed: the previous roster, device state and
    /// settings stay in place.
    pub async fn reload(&self) -> Result<ReloadSummary, ConfigError> {
        let config = Config::reload_with_env(&self.path, self.env).await?;
        Ok(self.apply(config))
    }

    /// Swap in the roster and settings from `config`.
    pub fn apply(&self, config: Config) -> ReloadSummary {
        let (registry, diagnostics) = DeviceRegistry::load(&config.devices);
        for diagnostic in &diagnostics {
            warn!("{diagnostic}");
        }
        registry.log_roster();
        let devices = registry.len();

        let removed = self.store.reconcile(registry);

        let settings_changed = self.settings.send_if_modified(|current| {
            if *current == config.settings {
                return false;
            }
            *current = config.settings.clone();
            true
        });
        if settings_changed {
            config.log_summary();
        }

        ReloadSummary {
            devices,
            removed,
            settings_changed,
        }
    }
}

/// Reload after change events have been quiet for `debounce`.
///
/// Failed reloads are logged and the previous configuration stays active.
pub async fn run_reload_handler(
    reloader: Reloader,
    mut events: mpsc::Receiver<()>,
    debounce: Duration,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => if event.is_none() { break },
        }

        // Settle: every further event restarts the quiet period.
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                event = events.recv() => if event.is_none() { break },
                _ = sleep(debounce) => break,
            }
        }

        match reloader.reload().await {
            Ok(summary) => info!(
                devices = summary.devices,
                removed = summary.removed.len(),
                settings_changed = summary.settings_changed,
                "configuration reloaded"
            ),
            Err(e) => warn!("configuration reload failed, keeping previous configuration: {e}"),
        }
    }
    debug!("reload handler stopped");
}
