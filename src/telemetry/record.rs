//! # Record Formatter
//!
//! Builds CSV records from the current position estimate and a telemetry snapshot.
//!
//! Two layouts exist, chosen once per session:
//!
//! ```text
//! Location: date,time,latitude,longitude,location_distance,<telemetry...>   (18 columns)
//! Basic:    date,time,<telemetry...>                                        (15 columns)
//! ```
//!
//! Floats use two decimals with a `.` separator regardless of locale.
//! Latitude and longitude keep full precision and always carry a fractional
//! part (`40.0`, not `40`). Free-text fields are quoted only when they contain
//! a delimiter, a quote or a line break, so every record keeps its header's
//! column count.

use chrono::NaiveDateTime;
use csv::{QuoteStyle, Terminator, WriterBuilder};
use std::fmt;
use std::io;

use super::TelemetrySnapshot;
use crate::error::{LoggerError, Result};
use crate::location::FusedPosition;

/// Header when position columns are logged
pub const LOCATION_HEADER: &str = "date,time,latitude,longitude,location_distance,speed,voltage,current,power,battery_level,distance,totaldistance,battery_temp,system_temp,tilt,roll,mode,alert";

/// Header when only telemetry columns are logged
pub const BASIC_HEADER: &str = "date,time,speed,voltage,current,power,battery_level,distance,totaldistance,battery_temp,system_temp,tilt,roll,mode,alert";

/// Local date column
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Local time column, millisecond precision
const TIME_FORMAT: &str = "%H:%M:%S%.3f";

/// Column layout of a session's output file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordLayout {
    /// Position columns followed by telemetry
    Location,
    /// Telemetry only
    Basic,
}

impl RecordLayout {
    /// Layout for a session with or without location logging
    pub fn for_session(log_location: bool) -> Self {
        if log_location {
            Self::Location
        } else {
            Self::Basic
        }
    }

    /// Header line for this layout
    pub fn header(&self) -> &'static str {
        match self {
            Self::Location => LOCATION_HEADER,
            Self::Basic => BASIC_HEADER,
        }
    }

    /// Number of comma-separated columns in this layout
    pub fn column_count(&self) -> usize {
        self.header().split(',').count()
    }
}

/// One formatted output line, without the line terminator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    line: String,
    fields: Vec<String>,
}

impl LogRecord {
    /// Record text as written to the file
    pub fn as_str(&self) -> &str {
        &self.line
    }

    /// Unquoted field values, in column order
    pub fn fields(&self) -> Vec<&str> {
        self.fields.iter().map(String::as_str).collect()
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.line)
    }
}

/// Format one record
///
/// # Arguments
///
/// * `timestamp` - Local wall-clock time of the tick
/// * `position` - Fused position for location sessions, `None` for basic sessions
/// * `snapshot` - Telemetry at the moment of the tick
///
/// # Returns
///
/// * `Result<LogRecord>` - Record matching [`RecordLayout::Location`] when
///   `position` is present, [`RecordLayout::Basic`] otherwise
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use telemetry_logger::location::FusedPosition;
/// use telemetry_logger::telemetry::TelemetrySnapshot;
/// use telemetry_logger::telemetry::record::format_record;
///
/// let ts = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap().and_hms_milli_opt(9, 30, 0, 5).unwrap();
/// let position = FusedPosition { fix: None, distance_km: 0.0 };
/// let record = format_record(&ts, Some(&position), &TelemetrySnapshot::default()).unwrap();
/// assert!(record.as_str().starts_with("2024-05-01,09:30:00.005,,,0.00,"));
/// ```
pub fn format_record(
    timestamp: &NaiveDateTime,
    position: Option<&FusedPosition>,
    snapshot: &TelemetrySnapshot,
) -> Result<LogRecord> {
    let mut fields = Vec::with_capacity(RecordLayout::Location.column_count());
    fields.push(timestamp.format(DATE_FORMAT).to_string());
    fields.push(timestamp.format(TIME_FORMAT).to_string());

    if let Some(position) = position {
        match &position.fix {
            Some(fix) => {
                fields.push(format!("{:?}", fix.latitude));
                fields.push(format!("{:?}", fix.longitude));
            }
            None => fields.extend([String::new(), String::new()]),
        }
        fields.push(format!("{:.2}", position.distance_km));
    }

    fields.extend([
        format!("{:.2}", snapshot.speed),
        format!("{:.2}", snapshot.voltage),
        format!("{:.2}", snapshot.current),
        format!("{:.2}", snapshot.power),
        snapshot.battery_level.to_string(),
        snapshot.distance.to_string(),
        snapshot.total_distance.to_string(),
        snapshot.temperature.to_string(),
        snapshot.temperature2.to_string(),
        format!("{:.2}", snapshot.tilt),
        format!("{:.2}", snapshot.roll),
        snapshot.mode.clone(),
        snapshot.alert.clone(),
    ]);

    let line = encode_line(&fields)?;
    Ok(LogRecord { line, fields })
}

/// Encode fields as one CSV line without its terminator
fn encode_line(fields: &[String]) -> Result<String> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Necessary)
        .terminator(Terminator::CRLF)
        .from_writer(Vec::new());
    writer.write_record(fields)?;

    let bytes = writer
        .into_inner()
        .map_err(|e| LoggerError::Io(e.into_error()))?;
    let mut line = String::from_utf8(bytes)
        .map_err(|e| LoggerError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))?;

    if line.ends_with("\r\n") {
        line.truncate(line.len() - 2);
    }
    Ok(line)
}
