//! # Session Events
//!
//! Inbound events from the wheel transport and outbound events published by
//! the session controller.

use std::fmt;
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing::trace;

/// Default capacity of the outbound event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Events raised by the wheel transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundEvent {
    /// The wheel connected or disconnected
    ConnectionStateChanged { connected: bool },
    /// New telemetry is available; triggers one tick
    DataAvailable,
}

/// Non-fatal conditions raised while starting a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// Location logging requested without location permission
    LocationPermissionDenied,
    /// Both GPS and network providers are disabled
    ProviderUnavailable,
    /// GPS preferred but disabled; network is used instead
    GpsDisabled,
    /// Network preferred but disabled; location logging is off
    NetworkDisabled,
}

impl WarningKind {
    /// User-facing message
    pub fn message(&self) -> &'static str {
        match self {
            WarningKind::LocationPermissionDenied => {
                "No location permission, logging without location data"
            }
            WarningKind::ProviderUnavailable => {
                "All location providers are disabled, logging without location data"
            }
            WarningKind::GpsDisabled => "GPS is disabled, using network location instead",
            WarningKind::NetworkDisabled => {
                "Network location is disabled, logging without location data"
            }
        }
    }
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// A warning for the presentation layer
///
/// Published once; `repeat` tells the presentation layer how many times to show it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Warning {
    pub kind: WarningKind,
    pub repeat: u8,
}

/// Events published by the session controller
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A session started (`running = true`) or stopped (`running = false`)
    SessionToggled { path: PathBuf, running: bool },
    /// A non-fatal start-time warning
    Warning(Warning),
}

/// Publish/subscribe channel for [`SessionEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Receive events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Publish to all current subscribers
    pub fn publish(&self, event: SessionEvent) {
        if self.tx.send(event).is_err() {
            trace!("Session event dropped, no subscribers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_CHANNEL_CAPACITY)
    }
}
