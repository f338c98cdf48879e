//! # Session Module
//!
//! Logging session lifecycle and event handling.
//!
//! This module handles:
//! - Precondition checks and location provider resolution at start
//! - Creating the session file and writing its header
//! - Producing one record per data-available tick
//! - Toggling the live location subscription on connection changes
//! - Flushing, announcing and handing off the file at stop
//!
//! State machine:
//!
//! ```text
//! Idle ──start──▶ Starting ──ok──▶ Running ──stop──▶ Stopping ──▶ Idle
//!                    │
//!                    └──precondition failed──▶ Idle
//! ```

pub mod events;

pub use events::{EventBus, InboundEvent, SessionEvent, Warning, WarningKind};

use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::error::{LoggerError, Result};
use crate::location::{FusedPosition, LocationFuser, LocationSource, Provider, UpdateSettings};
use crate::platform::{PermissionChecker, StorageChecker, Uploader};
use crate::telemetry::record::{format_record, LogRecord, RecordLayout};
use crate::telemetry::sink::FileSink;
use crate::telemetry::TelemetrySource;

/// Session file name stem (local time); the sink adds the extension
const FILE_STEM_FORMAT: &str = "%Y_%m_%d_%H_%M_%S";

/// Default number of times the presentation layer shows a warning
pub const DEFAULT_WARNING_REPEAT: u8 = 4;

/// Lifecycle state of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session
    Idle,
    /// Checking preconditions and creating the file
    Starting,
    /// Logging records
    Running,
    /// Draining, flushing and announcing the stop
    Stopping,
}

/// Per-session options chosen by the user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// Add position columns to the log
    pub log_location: bool,
    /// Prefer GPS over network positioning
    pub use_gps: bool,
    /// Hand the finished file to the uploader at stop
    pub auto_upload: bool,
}

/// An active (or just finished) logging session
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub file_name: String,
    pub path: PathBuf,
    pub started_at: DateTime<Local>,
    /// Whether position columns are logged; fixed for the session
    pub log_location: bool,
    /// Provider live updates come from, when logging location
    pub provider: Option<Provider>,
}

impl Session {
    /// Column layout of this session's file
    pub fn layout(&self) -> RecordLayout {
        RecordLayout::for_session(self.log_location)
    }
}

/// Outcome of resolving which provider to log from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderResolution {
    /// Provider to use, `None` disables location logging
    pub provider: Option<Provider>,
    /// Warning to surface, if the preference could not be honored
    pub warning: Option<WarningKind>,
}

/// Resolve the location provider for a session that requested location logging
///
/// Rules, first match wins:
/// 1. both providers disabled: no location, `ProviderUnavailable`
/// 2. GPS preferred but disabled: network, `GpsDisabled`
/// 3. network preferred but disabled: no location, `NetworkDisabled`
/// 4. otherwise the preferred provider
pub fn resolve_provider(prefer_gps: bool, gps_enabled: bool, network_enabled: bool) -> ProviderResolution {
    let (provider, warning) = if !gps_enabled && !network_enabled {
        (None, Some(WarningKind::ProviderUnavailable))
    } else if prefer_gps && !gps_enabled {
        (Some(Provider::Network), Some(WarningKind::GpsDisabled))
    } else if !prefer_gps && !network_enabled {
        (None, Some(WarningKind::NetworkDisabled))
    } else if prefer_gps {
        (Some(Provider::Gps), None)
    } else {
        (Some(Provider::Network), None)
    };

    ProviderResolution { provider, warning }
}

/// External services the controller depends on
#[derive(Clone)]
pub struct Collaborators {
    pub permissions: Arc<dyn PermissionChecker>,
    pub storage: Arc<dyn StorageChecker>,
    pub telemetry: Arc<dyn TelemetrySource>,
    pub location: Arc<dyn LocationSource>,
    pub uploader: Option<Arc<dyn Uploader>>,
}

/// Controller settings that outlive individual sessions
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Directory session files are created in
    pub log_dir: PathBuf,
    /// Live location update parameters
    pub updates: UpdateSettings,
    /// Presentation repeat count attached to warnings
    pub warning_repeat: u8,
}

impl ControllerSettings {
    pub fn new<P: Into<PathBuf>>(log_dir: P) -> Self {
        Self {
            log_dir: log_dir.into(),
            updates: UpdateSettings::default(),
            warning_repeat: DEFAULT_WARNING_REPEAT,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            log_dir: PathBuf::from(&config.logging.log_dir),
            updates: UpdateSettings {
                min_interval: config.location.min_interval(),
                min_distance_m: config.location.min_distance_m,
            },
            warning_repeat: config.notifications.warning_repeat,
        }
    }
}

struct ActiveSession {
    session: Session,
    sink: FileSink,
    fuser: Option<LocationFuser>,
    auto_upload: bool,
}

/// Coordinates one logging session at a time
///
/// All operations serialize on the session slot: a tick in progress finishes
/// before a stop or a connection change is processed.
pub struct SessionController {
    collaborators: Collaborators,
    settings: ControllerSettings,
    events: EventBus,
    state: watch::Sender<SessionState>,
    active: Mutex<Option<ActiveSession>>,
    uploads: Mutex<JoinSet<()>>,
}

impl SessionController {
    pub fn new(collaborators: Collaborators, settings: ControllerSettings) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            collaborators,
            settings,
            events: EventBus::default(),
            state,
            active: Mutex::new(None),
            uploads: Mutex::new(JoinSet::new()),
        }
    }

    /// Receive published [`SessionEvent`]s
    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Observe lifecycle state changes
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// The running session, if any
    pub async fn session(&self) -> Option<Session> {
        self.active.lock().await.as_ref().map(|a| a.session.clone())
    }

    /// Current fused position without advancing distance
    ///
    /// `None` when idle or when the session does not log location.
    pub async fn position(&self) -> Option<FusedPosition> {
        let active = self.active.lock().await;
        let fuser = active.as_ref()?.fuser.as_ref()?;
        let position = fuser.lock().await.position();
        Some(position)
    }

    /// Whether live location updates are currently being received
    pub async fn is_location_subscribed(&self) -> bool {
        let active = self.active.lock().await;
        active
            .as_ref()
            .and_then(|a| a.fuser.as_ref())
            .map_or(false, |f| f.is_subscribed())
    }

    /// Start a session
    ///
    /// # Arguments
    ///
    /// * `options` - Location and upload preferences for this session
    ///
    /// # Returns
    ///
    /// * `Result<Session>` - The started session
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - A session is already running
    /// - Storage permission is denied
    /// - Storage is not readable and writable
    /// - The session file cannot be created
    ///
    /// On error nothing is published and no file is left behind.
    pub async fn start(&self, options: SessionOptions) -> Result<Session> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            return Err(LoggerError::AlreadyRunning);
        }

        self.state.send_replace(SessionState::Starting);

        let (opened, warnings) = match self.open_session(options) {
            Ok(opened) => opened,
            Err(e) => {
                warn!("Failed to start logging session: {}", e);
                self.state.send_replace(SessionState::Idle);
                return Err(e);
            }
        };

        for kind in warnings {
            warn!("{}", kind);
            self.events.publish(SessionEvent::Warning(Warning {
                kind,
                repeat: self.settings.warning_repeat,
            }));
        }

        let session = opened.session.clone();
        self.events.publish(SessionEvent::SessionToggled {
            path: session.path.clone(),
            running: true,
        });
        *active = Some(opened);
        self.state.send_replace(SessionState::Running);

        info!(
            "Data logger started: {} (location: {})",
            session.path.display(),
            session.provider.map_or("off".to_string(), |p| p.to_string())
        );

        Ok(session)
    }

    fn open_session(&self, options: SessionOptions) -> Result<(ActiveSession, Vec<WarningKind>)> {
        let permissions = &self.collaborators.permissions;
        let storage = &self.collaborators.storage;
        let location = &self.collaborators.location;

        if !permissions.has_storage_permission() {
            return Err(LoggerError::NoStoragePermission);
        }

        if !storage.is_readable() || !storage.is_writable() {
            return Err(LoggerError::StorageUnavailable);
        }

        let mut warnings = Vec::new();
        let mut log_location = options.log_location;

        if log_location && !permissions.has_location_permission() {
            warnings.push(WarningKind::LocationPermissionDenied);
            log_location = false;
        }

        let provider = if log_location {
            let resolution = resolve_provider(
                options.use_gps,
                location.is_provider_enabled(Provider::Gps),
                location.is_provider_enabled(Provider::Network),
            );
            warnings.extend(resolution.warning);
            resolution.provider
        } else {
            None
        };

        let started_at = Local::now();
        let stem = started_at.format(FILE_STEM_FORMAT).to_string();
        let mut sink = FileSink::create(&self.settings.log_dir, &stem)?;

        let layout = RecordLayout::for_session(provider.is_some());
        if let Err(source) = sink.append(layout.header()) {
            let path = sink.path().to_path_buf();
            drop(sink);
            remove_if_empty(&path);
            return Err(LoggerError::FileCreate { path, source });
        }

        let fuser = provider.map(|provider| {
            let mut fuser = LocationFuser::seed(location.as_ref(), provider, self.settings.updates);
            fuser.subscribe(location.as_ref());
            fuser
        });

        let session = Session {
            file_name: sink.file_name(),
            path: sink.path().to_path_buf(),
            started_at,
            log_location: provider.is_some(),
            provider,
        };

        Ok((
            ActiveSession {
                session,
                sink,
                fuser,
                auto_upload: options.auto_upload,
            },
            warnings,
        ))
    }

    /// Produce and append one record
    ///
    /// # Returns
    ///
    /// * `Option<LogRecord>` - The record, or `None` when no session is running
    ///
    /// A failed append is logged and the session continues.
    pub async fn tick(&self) -> Option<LogRecord> {
        let mut active = self.active.lock().await;
        let Some(active) = active.as_mut() else {
            trace!("Data available with no running session");
            return None;
        };

        let telemetry = self.collaborators.telemetry.as_ref();
        let sink = &mut active.sink;
        let formatted = match &active.fuser {
            Some(fuser) => {
                // Held until the record is appended; live fixes wait
                let mut state = fuser.lock().await;
                let position = state.advance();
                write_record(sink, Some(&position), telemetry)
            }
            None => write_record(sink, None, telemetry),
        };

        let record = match formatted {
            Ok(record) => record,
            Err(e) => {
                warn!("Failed to format record for {}: {}", active.session.path.display(), e);
                return None;
            }
        };

        trace!("Logged record: {}", record);
        Some(record)
    }

    /// Enable or disable live location updates
    ///
    /// Keeps the last fix and accumulated distance. Ignored when idle or when
    /// the session does not log location.
    pub async fn set_connected(&self, connected: bool) {
        let mut active = self.active.lock().await;
        let Some(fuser) = active.as_mut().and_then(|a| a.fuser.as_mut()) else {
            debug!("Connection state {} ignored, no location session", connected);
            return;
        };

        if connected {
            fuser.subscribe(self.collaborators.location.as_ref());
        } else {
            fuser.unsubscribe();
        }
    }

    /// Dispatch an inbound event
    ///
    /// # Returns
    ///
    /// * `Option<LogRecord>` - The record produced by a `DataAvailable` tick
    pub async fn handle(&self, event: InboundEvent) -> Option<LogRecord> {
        match event {
            InboundEvent::ConnectionStateChanged { connected } => {
                self.set_connected(connected).await;
                None
            }
            InboundEvent::DataAvailable => self.tick().await,
        }
    }

    /// Stop the running session
    ///
    /// Waits for an in-flight tick, flushes the file, publishes
    /// `SessionToggled { running: false }` and hands the file to the uploader
    /// when auto-upload is on. Calling it while idle does nothing.
    ///
    /// # Returns
    ///
    /// * `Option<Session>` - The session that was stopped
    pub async fn stop(&self) -> Option<Session> {
        let mut active = self.active.lock().await;
        let Some(mut stopping) = active.take() else {
            debug!("Stop requested with no running session");
            return None;
        };

        self.state.send_replace(SessionState::Stopping);

        if let Some(fuser) = stopping.fuser.as_mut() {
            fuser.unsubscribe();
        }

        if let Err(e) = stopping.sink.flush() {
            warn!("Failed to flush {}: {}", stopping.sink.path().display(), e);
        }

        let path = stopping.session.path.clone();
        self.events.publish(SessionEvent::SessionToggled {
            path: path.clone(),
            running: false,
        });

        if stopping.auto_upload {
            match &self.collaborators.uploader {
                Some(uploader) => {
                    let uploader = Arc::clone(uploader);
                    let upload_path = path.clone();
                    let mut uploads = self.uploads.lock().await;
                    reap_finished(&mut uploads);
                    uploads.spawn(async move { uploader.upload(upload_path).await });
                }
                None => debug!("Auto-upload enabled but no uploader configured"),
            }
        }

        info!(
            "Data logger stopped: {} ({} records)",
            path.display(),
            stopping.sink.lines_written().saturating_sub(1)
        );

        self.state.send_replace(SessionState::Idle);
        Some(stopping.session)
    }

    /// Wait for uploads handed off by [`SessionController::stop`] to finish
    pub async fn wait_for_uploads(&self) {
        let mut uploads = self.uploads.lock().await;
        while let Some(result) = uploads.join_next().await {
            log_upload_result(result);
        }
    }
}

/// Format a record at the current local time and append it
///
/// Append failures are logged by the sink; only formatting can fail here.
fn write_record(
    sink: &mut FileSink,
    position: Option<&FusedPosition>,
    telemetry: &dyn TelemetrySource,
) -> Result<LogRecord> {
    let record = format_record(&Local::now().naive_local(), position, &telemetry.snapshot())?;
    sink.append_or_warn(record.as_str());
    Ok(record)
}

/// Drop upload tasks that have already completed
fn reap_finished(uploads: &mut JoinSet<()>) {
    while let Some(result) = uploads.try_join_next() {
        log_upload_result(result);
    }
}

fn log_upload_result(result: std::result::Result<(), JoinError>) {
    if let Err(e) = result {
        warn!("Upload task failed: {}", e);
    }
}

fn remove_if_empty(path: &Path) {
    let empty = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(false);
    if empty {
        if let Err(e) = fs::remove_file(path) {
            debug!("Failed to remove {}: {}", path.display(), e);
        }
    }
}
