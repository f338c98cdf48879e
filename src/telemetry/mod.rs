//! # Telemetry Module
//!
//! Handles telemetry logging to CSV session files.
//!
//! This module handles:
//! - Reading a snapshot of the wheel's current telemetry
//! - Formatting one CSV record per data-available tick
//! - Appending records to the session's output file

pub mod record;
pub mod sink;

use serde::Deserialize;

/// Read-only view of the wheel's telemetry at the moment of a tick
///
/// Owned and updated by the transport that decodes the wheel's protocol;
/// the logger only reads it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TelemetrySnapshot {
    /// Speed in km/h
    pub speed: f64,

    /// Battery voltage in volts
    pub voltage: f64,

    /// Phase current in amperes
    pub current: f64,

    /// Power in watts
    pub power: f64,

    /// Battery level in percent
    pub battery_level: i32,

    /// Trip distance in meters
    pub distance: i64,

    /// Odometer in meters
    pub total_distance: i64,

    /// Battery (first sensor) temperature in °C
    pub temperature: i32,

    /// System (second sensor) temperature in °C
    pub temperature2: i32,

    /// Pitch angle in degrees
    pub tilt: f64,

    /// Roll angle in degrees
    pub roll: f64,

    /// Ride mode as reported by the wheel
    pub mode: String,

    /// Active alert text, empty when none
    pub alert: String,
}

/// Source of telemetry snapshots
///
/// Implemented by the wheel transport. Reads are synchronous and must not block.
#[cfg_attr(test, mockall::automock)]
pub trait TelemetrySource: Send + Sync {
    /// Current telemetry state
    fn snapshot(&self) -> TelemetrySnapshot;
}
