use std::sync::Arc;
use std::time::Duration;

use courier_config::{AppConfig, LogFormatSetting, prepare_layout};
use courier_core::{CodeDecoder, DestinationLookup, Uploader};
use courier_data::{ConnectSettings, PgDestinationLookup};
use courier_events::EventBus;
use courier_runtime::ReferenceStore;
use courier_telemetry::{
    DEFAULT_LOG_LEVEL, GlobalContextGuard, LogFormat, LoggingConfig, Metrics, build_sha,
    init_logging, record_remote_log,
};
use tracing::{error, info, warn};

use crate::decode::QrDecoder;
use crate::error::{AppError, AppResult};
use crate::pipeline::{ShutdownSender, run_until_shutdown, shutdown_channel};
use crate::processor::FileProcessor;
use crate::resolver::Resolver;
use crate::scheduler;
use crate::upload::build_uploader;
use crate::watcher::spawn_watcher;

const LOOKUP_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);
const LOOKUP_MAX_CONNECTIONS: u32 = 2;

/// Collaborators wired from configuration for the watch loop.
pub(crate) struct BootstrapDependencies {
    config: AppConfig,
    lookup: Arc<dyn DestinationLookup>,
    uploader: Arc<dyn Uploader>,
    decoder: Arc<dyn CodeDecoder>,
    events: EventBus,
    telemetry: Metrics,
}

impl BootstrapDependencies {
    /// Connect production collaborators and run their startup checks.
    pub(crate) async fn from_config(config: AppConfig) -> AppResult<Self> {
        let telemetry =
            Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;

        let settings = connect_settings(&config);
        let lookup = PgDestinationLookup::connect(&settings)
            .await
            .map_err(|err| AppError::data("lookup.connect", err))?;
        lookup
            .check()
            .await
            .map_err(|err| AppError::startup_check("lookup", err))?;

        let uploader = build_uploader(&config.upload)?;
        uploader
            .check()
            .await
            .map_err(|err| AppError::startup_check("uploader", err))?;

        Ok(Self {
            config,
            lookup: Arc::new(lookup),
            uploader,
            decoder: Arc::new(QrDecoder),
            events: EventBus::new(),
            telemetry,
        })
    }
}

fn connect_settings(config: &AppConfig) -> ConnectSettings {
    ConnectSettings {
        user: config.postgres.user.clone(),
        password: config.postgres.password.clone(),
        host: config.postgres.host.clone(),
        port: config.postgres.port,
        database: config.postgres.database.clone(),
        acquire_timeout: LOOKUP_ACQUIRE_TIMEOUT,
        max_connections: LOOKUP_MAX_CONNECTIONS,
    }
}

fn logging_format(config: &AppConfig) -> LogFormat {
    let requested = config
        .logging
        .as_ref()
        .and_then(|logging| logging.format)
        .map(|format| match format {
            LogFormatSetting::Json => LogFormat::Json,
            LogFormatSetting::Pretty => LogFormat::Pretty,
        });
    LogFormat::resolve(requested, config.remote_log.is_some())
}

/// Entry point for the watch service.
///
/// Loads configuration, installs logging, connects collaborators, then runs
/// the watch loop until SIGINT or SIGTERM.
///
/// # Errors
///
/// Returns an error if configuration, logging, a startup check, or the
/// filesystem watcher fails.
pub async fn run_app() -> AppResult<()> {
    let config = match courier_config::load_from_env() {
        Ok(config) => config,
        Err(err) => {
            // Logging settings live in the file that failed to load.
            init_logging(&LoggingConfig::default())
                .map_err(|err| AppError::telemetry("telemetry.init", err))?;
            error!(error = %err, "failed to load configuration");
            return Err(AppError::config("config.load", err));
        }
    };

    let level = config
        .logging
        .as_ref()
        .and_then(|logging| logging.level.clone())
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());
    init_logging(&LoggingConfig {
        level: &level,
        format: logging_format(&config),
        build_sha: option_env!("COURIER_BUILD_SHA").unwrap_or("dev"),
    })
    .map_err(|err| AppError::telemetry("telemetry.init", err))?;
    let _context = GlobalContextGuard::new("watch");
    if let Some(remote) = &config.remote_log {
        record_remote_log(&remote.log_group, &remote.stream_name);
        info!(
            log_group = %remote.log_group,
            stream = %remote.stream_name,
            send_interval = remote.send_interval,
            "remote log routing recorded"
        );
    }
    info!(build_sha = build_sha(), "courier starting");

    let dependencies = BootstrapDependencies::from_config(config).await?;
    let (stop, shutdown) = shutdown_channel();
    let signals = tokio::spawn(forward_signals(stop));
    let result = run_app_with(dependencies, shutdown).await;
    signals.abort();
    result
}

/// Boot sequence over injected collaborators.
pub(crate) async fn run_app_with(
    dependencies: BootstrapDependencies,
    shutdown: crate::pipeline::ShutdownReceiver,
) -> AppResult<()> {
    let BootstrapDependencies {
        config,
        lookup,
        uploader,
        decoder,
        events,
        telemetry,
    } = dependencies;

    let layout = prepare_layout(&config.layout())
        .map_err(|err| AppError::config("layout.prepare", err))?;
    let store = Arc::new(ReferenceStore::open(&config.snapshot_path));
    telemetry.set_active_destinations(store.current().len());
    info!(
        destinations = store.current().len(),
        snapshot = %store.path().display(),
        "reference state loaded"
    );

    let resolver = Resolver::new(lookup, Arc::clone(&store), events.clone(), telemetry.clone());
    let processor = FileProcessor::new(
        layout.clone(),
        resolver,
        decoder,
        uploader,
        events,
        telemetry.clone(),
    )
    .with_date_subdirs(config.date_subdirs);

    let (timer, fires) = scheduler::channel(config.quiet_period());
    let watch = spawn_watcher(&layout.unprocessed, timer.clone(), telemetry.clone())?;
    let passes = run_until_shutdown(&processor, &timer, fires, shutdown, watch.stop()).await;
    timer.cancel();

    let summary = telemetry.snapshot();
    info!(
        passes,
        files_done = summary.files_done_total,
        files_error = summary.files_error_total,
        files_stranded = summary.files_stranded_total,
        uploads_failed = summary.uploads_failed_total,
        snapshot_write_failures = summary.snapshot_write_failures_total,
        active_destinations = summary.active_destinations,
        "courier shutdown complete"
    );
    Ok(())
}

/// Request shutdown on SIGINT, or SIGTERM on Unix.
async fn forward_signals(stop: ShutdownSender) {
    wait_for_signal().await;
    info!("termination signal received; finishing current pass");
    let _ = stop.send(true);
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                result = tokio::signal::ctrl_c() => log_ctrl_c(result),
                _ = terminate.recv() => {}
            }
        }
        Err(err) => {
            warn!(error = %err, "SIGTERM handler unavailable; listening for SIGINT only");
            log_ctrl_c(tokio::signal::ctrl_c().await);
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    log_ctrl_c(tokio::signal::ctrl_c().await);
}

fn log_ctrl_c(result: std::io::Result<()>) {
    if let Err(err) = result {
        warn!(error = %err, "SIGINT handler failed");
    }
}
