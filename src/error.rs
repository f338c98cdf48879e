//! # Error Types
//!
//! Custom error types for the telemetry logger using `thiserror`.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the telemetry logger
#[derive(Debug, Error)]
pub enum LoggerError {
    /// Storage permission was denied by the platform
    #[error("No permission to write to storage")]
    NoStoragePermission,

    /// Storage is not both readable and writable
    #[error("Storage is unavailable for reading and writing")]
    StorageUnavailable,

    /// The session output file could not be created
    #[error("Failed to create log file {}: {source}", .path.display())]
    FileCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A session is already running on this controller
    #[error("A logging session is already running")]
    AlreadyRunning,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Replay input errors
    #[error("Replay parse error: {0}")]
    Replay(#[from] serde_json::Error),

    /// Record encoding errors
    #[error("Record encoding error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the telemetry logger
pub type Result<T> = std::result::Result<T, LoggerError>;
