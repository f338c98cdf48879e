//! # Telemetry Logger
//!
//! Log electric wheel telemetry to CSV session files.
//!
//! This application replays recorded wheel telemetry and position fixes
//! through the session controller, producing the same CSV output a live
//! transport would.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval, Duration};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use telemetry_logger::config::Config;
use telemetry_logger::platform::{DesktopPermissions, DirectoryStorage, DirectoryUploader, Uploader};
use telemetry_logger::replay::{self, ReplayDriver};
use telemetry_logger::session::{Collaborators, ControllerSettings, SessionController, SessionEvent};

/// Configuration file used when no path is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// File name prefix of the application's own diagnostic log
const APP_LOG_PREFIX: &str = "telemetry-logger";

/// Main entry point for Telemetry Logger
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (first argument, or `config/default.toml`)
///    - Set up console and rolling-file logging
///    - Load the replay file and build the session controller
///
/// 2. **Main Loop**
///    - Start a session with the configured options
///    - Dispatch one replayed event per tick interval
///    - Handle Ctrl+C for graceful shutdown
///
/// 3. **Graceful Shutdown**
///    - Stop the session (flush, announce, hand off for upload)
///    - Wait for uploads to finish
///
/// # Errors
///
/// Returns error if the configuration or replay file cannot be loaded, or the
/// session cannot be started.
///
/// # Examples
///
/// ```bash
/// cargo run --release -- config/default.toml
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    let _log_guard = init_logging(Path::new(&config.logging.log_dir))?;

    info!("Telemetry Logger v{} starting...", env!("CARGO_PKG_VERSION"));

    let events = replay::load(&config.replay.path)
        .with_context(|| format!("Failed to load replay file {}", config.replay.path))?;
    info!("Loaded {} replay events from {}", events.len(), config.replay.path);

    let driver = ReplayDriver::new(config.replay.gps_enabled, config.replay.network_enabled);
    let uploader = config
        .logging
        .auto_upload
        .then(|| Arc::new(DirectoryUploader::new(&config.logging.upload_dir)) as Arc<dyn Uploader>);

    let controller = SessionController::new(
        Collaborators {
            permissions: Arc::new(DesktopPermissions),
            storage: Arc::new(DirectoryStorage::new(&config.logging.log_dir)),
            telemetry: driver.telemetry_source(),
            location: driver.location_source(),
            uploader,
        },
        ControllerSettings::from_config(&config),
    );

    let notifications = tokio::spawn(report_events(controller.subscribe_events()));

    let session = controller.start(config.logging.session_options()).await?;
    info!("Logging to {}", session.path.display());
    info!("Press Ctrl+C to exit");

    let mut tick = interval(Duration::from_millis(config.replay.tick_interval_ms));
    let mut pending = events.into_iter();
    let mut records: u64 = 0;

    loop {
        tokio::select! {
            _ = tick.tick() => {
                let Some(event) = pending.next() else {
                    info!("Replay finished");
                    break;
                };
                if driver.dispatch(event, &controller).await.is_some() {
                    records += 1;
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    controller.stop().await;
    controller.wait_for_uploads().await;
    info!("Total records logged: {}", records);

    drop(controller);
    notifications.await.ok();

    Ok(())
}

/// Console plus daily-rolling file logging
///
/// The returned guard must be held until exit so buffered lines are written.
fn init_logging(log_dir: &Path) -> Result<WorkerGuard> {
    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(APP_LOG_PREFIX)
        .filename_suffix("log")
        .build(log_dir)
        .context("Failed to create application log file")?;
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    Ok(guard)
}

/// Presentation layer for session events
async fn report_events(mut events: tokio::sync::broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::Warning(warning)) => {
                for _ in 0..warning.repeat {
                    warn!("{}", warning.kind);
                }
            }
            Ok(SessionEvent::SessionToggled { path, running }) => {
                info!("Logging {} ({})", if running { "started" } else { "stopped" }, path.display());
            }
            Err(RecvError::Lagged(n)) => warn!("Missed {} session events", n),
            Err(RecvError::Closed) => break,
        }
    }
}
