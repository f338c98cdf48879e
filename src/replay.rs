//! # Telemetry Replay
//!
//! Drives the session controller from a recorded JSON Lines file, standing in
//! for the live wheel transport and the platform location service.
//!
//! Each non-empty line is one event:
//!
//! ```text
//! {"event":"connection","connected":true}
//! {"event":"fix","latitude":50.45,"longitude":30.52,"time_ms":1700000000000}
//! {"event":"telemetry","speed":21.3,"voltage":82.4,"battery_level":71,"mode":"soft"}
//! ```
//!
//! Lines starting with `#` are comments.

use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::Result;
use crate::location::{LocationSample, LocationSource, Provider, UpdateSettings};
use crate::session::{InboundEvent, SessionController};
use crate::telemetry::record::LogRecord;
use crate::telemetry::{TelemetrySnapshot, TelemetrySource};

/// Capacity of the replayed live-fix channel
const FIX_CHANNEL_CAPACITY: usize = 16;

/// One recorded event
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ReplayEvent {
    /// Wheel connection change
    Connection { connected: bool },
    /// Position fix from the active provider
    Fix(LocationSample),
    /// New telemetry from the wheel
    Telemetry(TelemetrySnapshot),
}

/// Parse a single line; blank lines and comments yield `None`
pub fn parse_line(line: &str) -> Result<Option<ReplayEvent>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(line)?))
}

/// Load all events from a JSON Lines file
///
/// # Errors
///
/// Returns error if the file cannot be read or any line fails to parse
pub fn load<P: AsRef<Path>>(path: P) -> Result<Vec<ReplayEvent>> {
    let contents = fs::read_to_string(path)?;
    let mut events = Vec::new();
    for line in contents.lines() {
        if let Some(event) = parse_line(line)? {
            events.push(event);
        }
    }
    Ok(events)
}

/// Telemetry snapshot shared between the replay driver and the controller
#[derive(Debug, Clone, Default)]
pub struct SharedTelemetry {
    snapshot: Arc<RwLock<TelemetrySnapshot>>,
}

impl SharedTelemetry {
    pub fn update(&self, snapshot: TelemetrySnapshot) {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }
}

impl TelemetrySource for SharedTelemetry {
    fn snapshot(&self) -> TelemetrySnapshot {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[derive(Debug, Default)]
struct LocationInner {
    last_known: Option<LocationSample>,
    subscriber: Option<mpsc::Sender<LocationSample>>,
}

/// Location service fed from replayed fixes
///
/// Both providers report the same replayed fixes; which ones count as enabled
/// comes from configuration.
#[derive(Debug, Clone)]
pub struct ReplayLocation {
    gps_enabled: bool,
    network_enabled: bool,
    inner: Arc<Mutex<LocationInner>>,
}

impl ReplayLocation {
    pub fn new(gps_enabled: bool, network_enabled: bool) -> Self {
        Self {
            gps_enabled,
            network_enabled,
            inner: Arc::new(Mutex::new(LocationInner::default())),
        }
    }

    /// Record a fix and deliver it to the live subscriber, if any
    pub fn deliver(&self, fix: LocationSample) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.last_known = Some(fix);

        if let Some(subscriber) = &inner.subscriber {
            if subscriber.try_send(fix).is_err() {
                trace!("Fix dropped, no live subscriber or channel full");
            }
        }
    }

    fn enabled(&self, provider: Provider) -> bool {
        match provider {
            Provider::Gps => self.gps_enabled,
            Provider::Network => self.network_enabled,
        }
    }
}

impl LocationSource for ReplayLocation {
    fn is_provider_enabled(&self, provider: Provider) -> bool {
        self.enabled(provider)
    }

    fn last_known_fix(&self, provider: Provider) -> Option<LocationSample> {
        if !self.enabled(provider) {
            return None;
        }
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_known
    }

    fn subscribe(&self, provider: Provider, settings: UpdateSettings) -> mpsc::Receiver<LocationSample> {
        debug!(
            "Replay subscription for {} (min interval {:?})",
            provider, settings.min_interval
        );
        let (tx, rx) = mpsc::channel(FIX_CHANNEL_CAPACITY);
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .subscriber = Some(tx);
        rx
    }
}

/// Feeds replayed events into a controller
#[derive(Debug, Clone)]
pub struct ReplayDriver {
    telemetry: SharedTelemetry,
    location: ReplayLocation,
}

impl ReplayDriver {
    pub fn new(gps_enabled: bool, network_enabled: bool) -> Self {
        Self {
            telemetry: SharedTelemetry::default(),
            location: ReplayLocation::new(gps_enabled, network_enabled),
        }
    }

    /// Telemetry source to hand to the controller
    pub fn telemetry_source(&self) -> Arc<dyn TelemetrySource> {
        Arc::new(self.telemetry.clone())
    }

    /// Location source to hand to the controller
    pub fn location_source(&self) -> Arc<dyn LocationSource> {
        Arc::new(self.location.clone())
    }

    /// Apply one event
    ///
    /// # Returns
    ///
    /// * `Option<LogRecord>` - The record produced by a telemetry event
    pub async fn dispatch(&self, event: ReplayEvent, controller: &SessionController) -> Option<LogRecord> {
        match event {
            ReplayEvent::Connection { connected } => {
                controller
                    .handle(InboundEvent::ConnectionStateChanged { connected })
                    .await
            }
            ReplayEvent::Fix(fix) => {
                self.location.deliver(fix);
                None
            }
            ReplayEvent::Telemetry(snapshot) => {
                self.telemetry.update(snapshot);
                controller.handle(InboundEvent::DataAvailable).await
            }
        }
    }
}
