use anyhow::Context;
use clap::Parser;
use std::future::Future;
use std::net::SocketAddr;
use std::panic::{self, PanicHookInfo};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use govee_exporter::logging::{self, LogFormat};
use govee_exporter::reload::{self, Reloader};
use govee_exporter::scanner::{self, Backend};
use govee_exporter::weather::{self, OpenMeteoClient};
use govee_exporter::{
    Config, DeviceRegistry, MetricsSink, PrometheusMetrics, TelemetryStore, app, server,
};

/// Exit codes for the application
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_PANIC: i32 = 2;

/// How long tasks get to wind down after a shutdown request.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(author, about, version)]
struct Options {
    /// Path to the YAML configuration file. A missing file means defaults
    /// and an empty device roster.
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Bluetooth backend to scan with.
    #[arg(long, value_enum, default_value_t = Backend::default())]
    backend: Backend,

    /// Directory with dashboard assets, served at / and /static/.
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::default())]
    log_format: LogFormat,

    /// Verbose output, log rejected advertisements and task details
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

type Tasks = JoinSet<anyhow::Result<()>>;

/// Spawn a task whose failure takes the whole exporter down.
fn spawn_task<F>(tasks: &mut Tasks, cancel: &CancellationToken, task: F)
where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let cancel = cancel.clone();
    tasks.spawn(async move {
        let result = task.await;
        if result.is_err() {
            cancel.cancel();
        }
        result
    });
}

/// Resolves on Ctrl-C or SIGTERM.
#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// Wire up every task and run until a signal arrives or a task fails.
///
/// This function:
/// 1. Loads the configuration and builds the initial device roster
/// 2. Opens the radio and binds the scrape endpoint
/// 3. Spawns the scan loop, sweeper, reload watcher, weather poller and
///    HTTP server, all sharing one cancellation token
/// 4. On shutdown, waits up to [`SHUTDOWN_TIMEOUT`] for them to stop
async fn run(options: Options) -> anyhow::Result<()> {
    let config = Config::load(&options.config)
        .with_context(|| format!("failed to load {}", options.config.display()))?;
    config.log_summary();

    let (registry, diagnostics) = DeviceRegistry::load(&config.devices);
    for diagnostic in &diagnostics {
        warn!("{diagnostic}");
    }
    registry.log_roster();

    let metrics = Arc::new(PrometheusMetrics::new().context("failed to create metrics registry")?);
    let store = Arc::new(TelemetryStore::new(registry, metrics.clone()));
    let (settings_tx, settings_rx) = watch::channel(config.settings.clone());
    let cancel = CancellationToken::new();

    let radio = scanner::open_radio(options.backend).await?;
    let weather_client = OpenMeteoClient::new().context("failed to create HTTP client")?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.settings.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "serving metrics");

    let mut tasks = Tasks::new();

    spawn_task(&mut tasks, &cancel, {
        let (store, settings, cancel) = (store.clone(), settings_rx.clone(), cancel.clone());
        async move {
            app::run_scan_loop(radio, store, settings, cancel)
                .await
                .map_err(anyhow::Error::from)
        }
    });

    spawn_task(&mut tasks, &cancel, {
        let (store, settings, cancel) = (store.clone(), settings_rx.clone(), cancel.clone());
        async move {
            app::run_sweeper(store, settings, cancel).await;
            Ok(())
        }
    });

    let (events_tx, events_rx) = mpsc::channel(1);
    spawn_task(&mut tasks, &cancel, {
        let (path, cancel) = (options.config.clone(), cancel.clone());
        async move {
            reload::watch_file(path, reload::POLL_INTERVAL, events_tx, cancel).await;
            Ok(())
        }
    });

    spawn_task(&mut tasks, &cancel, {
        let reloader = Reloader::new(options.config.clone(), store, settings_tx);
        let cancel = cancel.clone();
        async move {
            reload::run_reload_handler(reloader, events_rx, reload::DEBOUNCE, cancel).await;
            Ok(())
        }
    });

    spawn_task(&mut tasks, &cancel, {
        let sink: Arc<dyn MetricsSink> = metrics.clone();
        let (settings, cancel) = (settings_rx, cancel.clone());
        async move {
            weather::run_weather_poller(Arc::new(weather_client), sink, settings, cancel).await;
            Ok(())
        }
    });

    spawn_task(&mut tasks, &cancel, {
        let router = server::router(metrics, options.static_dir.as_deref());
        let cancel = cancel.clone();
        async move {
            server::serve(listener, router, cancel)
                .await
                .context("HTTP server failed")
        }
    });

    tokio::select! {
        signal = shutdown_signal() => match signal {
            Ok(()) => info!("shutdown signal received"),
            Err(e) => error!("failed to listen for shutdown signal: {e}"),
        },
        _ = cancel.cancelled() => {}
    }
    cancel.cancel();

    let drain = async {
        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let result = joined
                .map_err(anyhow::Error::from)
                .and_then(std::convert::identity);
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    };

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, drain).await {
        Ok(result) => result,
        Err(_) => {
            warn!("tasks did not stop within {SHUTDOWN_TIMEOUT:?}, exiting anyway");
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    // Set up panic hook to ensure clean exit codes for process managers
    // (e.g., systemd, docker) that monitor exit status
    panic::set_hook(Box::new(move |info: &PanicHookInfo| {
        eprintln!("Panic! {}", info);
        std::process::exit(EXIT_PANIC);
    }));

    let options = Options::parse();

    if let Err(why) = logging::init(options.log_format, options.verbose) {
        eprintln!("error: {:#}", why);
        std::process::exit(EXIT_ERROR);
    }

    match run(options).await {
        Ok(()) => {
            info!("shutdown complete");
            std::process::exit(EXIT_SUCCESS)
        }
        Err(why) => {
            error!("{:#}", why);
            std::process::exit(EXIT_ERROR);
        }
    }
}
