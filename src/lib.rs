//! # Telemetry Logger Library
//!
//! Log electric wheel telemetry to CSV session files, optionally fused with
//! GPS or network position.
//!
//! This library provides the session controller that turns data-available
//! ticks from a wheel transport into timestamped records, together with the
//! location fusion, record formatting and file output it relies on.

pub mod config;
pub mod error;
pub mod location;
pub mod platform;
pub mod replay;
pub mod session;
pub mod telemetry;
