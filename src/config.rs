//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{LoggerError, Result};
use crate::session::SessionOptions;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub logging: LoggingConfig,
    #[serde(default)]
    pub location: LocationConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
}

/// Session logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_log_location")]
    pub log_location: bool,

    #[serde(default = "default_use_gps")]
    pub use_gps: bool,

    #[serde(default)]
    pub auto_upload: bool,

    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,
}

/// Live location subscription configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LocationConfig {
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,

    #[serde(default = "default_min_distance_m")]
    pub min_distance_m: f32,
}

/// User-facing warning configuration
#[derive(Debug, Deserialize, Clone)]
pub struct NotificationConfig {
    #[serde(default = "default_warning_repeat")]
    pub warning_repeat: u8,
}

/// Telemetry replay configuration for the desktop binary
#[derive(Debug, Deserialize, Clone)]
pub struct ReplayConfig {
    #[serde(default = "default_replay_path")]
    pub path: String,

    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    #[serde(default = "default_provider_enabled")]
    pub gps_enabled: bool,

    #[serde(default = "default_provider_enabled")]
    pub network_enabled: bool,
}

// Default value functions
fn default_log_dir() -> String { "./logs".to_string() }
fn default_log_location() -> bool { true }
fn default_use_gps() -> bool { true }
fn default_upload_dir() -> String { "./uploads".to_string() }

fn default_min_interval_ms() -> u64 { 250 }
fn default_min_distance_m() -> f32 { 0.0 }

fn default_warning_repeat() -> u8 { 4 }

fn default_replay_path() -> String { "./telemetry.jsonl".to_string() }
fn default_tick_interval_ms() -> u64 { 100 }
fn default_provider_enabled() -> bool { true }

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval_ms(),
            min_distance_m: default_min_distance_m(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            warning_repeat: default_warning_repeat(),
        }
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            path: default_replay_path(),
            tick_interval_ms: default_tick_interval_ms(),
            gps_enabled: default_provider_enabled(),
            network_enabled: default_provider_enabled(),
        }
    }
}

impl LocationConfig {
    /// Minimum interval between live position updates
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

impl LoggingConfig {
    /// Per-session options derived from the logging settings
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            log_location: self.log_location,
            use_gps: self.use_gps,
            auto_upload: self.auto_upload,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use telemetry_logger::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        if self.logging.log_dir.is_empty() {
            return Err(invalid("log_dir cannot be empty"));
        }

        if self.logging.auto_upload && self.logging.upload_dir.is_empty() {
            return Err(invalid("upload_dir cannot be empty when auto_upload is enabled"));
        }

        if self.location.min_interval_ms == 0 || self.location.min_interval_ms > 60000 {
            return Err(invalid("min_interval_ms must be between 1 and 60000"));
        }

        if !self.location.min_distance_m.is_finite() || self.location.min_distance_m < 0.0 {
            return Err(invalid("min_distance_m must be a finite value >= 0.0"));
        }

        if self.notifications.warning_repeat == 0 || self.notifications.warning_repeat > 10 {
            return Err(invalid("warning_repeat must be between 1 and 10"));
        }

        if self.replay.path.is_empty() {
            return Err(invalid("replay path cannot be empty"));
        }

        if self.replay.tick_interval_ms == 0 || self.replay.tick_interval_ms > 60000 {
            return Err(invalid("tick_interval_ms must be between 1 and 60000"));
        }

        Ok(())
    }
}

fn invalid(msg: &str) -> LoggerError {
    LoggerError::Config(toml::de::Error::custom(msg))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_valid_config() -> Config {
        Config {
            logging: LoggingConfig {
                log_dir: default_log_dir(),
                log_location: default_log_location(),
                use_gps: default_use_gps(),
                auto_upload: false,
                upload_dir: default_upload_dir(),
            },
            location: LocationConfig::default(),
            notifications: NotificationConfig::default(),
            replay: ReplayConfig::default(),
        }
    }

    #[test]
    fn test_default_config() {
        assert!(create_valid_config().validate().is_ok());
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[logging]
log_dir = "/tmp/wheel-logs"
use_gps = false

[replay]
path = "ride.jsonl"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.logging.log_dir, "/tmp/wheel-logs");
        assert!(!config.logging.use_gps);
        assert!(config.logging.log_location);

        // Omitted sections fall back to defaults
        assert_eq!(config.location.min_interval_ms, 250);
        assert_eq!(config.location.min_distance_m, 0.0);
        assert_eq!(config.notifications.warning_repeat, 4);
        assert_eq!(config.replay.tick_interval_ms, 100);
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("/nonexistent/telemetry-logger.toml");
        assert!(matches!(result, Err(LoggerError::Io(_))));
    }

    #[test]
    fn test_load_malformed_toml() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[logging\nlog_dir = ").unwrap();
        temp_file.flush().unwrap();

        let result = Config::load(temp_file.path());
        assert!(matches!(result, Err(LoggerError::Config(_))));
    }

    #[test]
    fn test_empty_log_dir() {
        let mut config = create_valid_config();
        config.logging.log_dir = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_upload_dir_when_auto_upload() {
        let mut config = create_valid_config();
        config.logging.auto_upload = true;
        config.logging.upload_dir = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_upload_dir_without_auto_upload() {
        let mut config = create_valid_config();
        config.logging.auto_upload = false;
        config.logging.upload_dir = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_min_interval_zero() {
        let mut config = create_valid_config();
        config.location.min_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_min_interval_too_high() {
        let mut config = create_valid_config();
        config.location.min_interval_ms = 60001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_min_distance_negative() {
        let mut config = create_valid_config();
        config.location.min_distance_m = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_min_distance_nan() {
        let mut config = create_valid_config();
        config.location.min_distance_m = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_warning_repeat_range() {
        let mut config = create_valid_config();
        config.notifications.warning_repeat = 0;
        assert!(config.validate().is_err());

        config.notifications.warning_repeat = 11;
        assert!(config.validate().is_err());

        config.notifications.warning_repeat = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_replay_path() {
        let mut config = create_valid_config();
        config.replay.path = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tick_interval_zero() {
        let mut config = create_valid_config();
        config.replay.tick_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_session_options_from_logging() {
        let mut config = create_valid_config();
        config.logging.use_gps = false;
        config.logging.auto_upload = true;

        let options = config.logging.session_options();
        assert!(options.log_location);
        assert!(!options.use_gps);
        assert!(options.auto_upload);
    }

    #[test]
    fn test_min_interval_duration() {
        let config = create_valid_config();
        assert_eq!(config.location.min_interval(), Duration::from_millis(250));
    }

    #[test]
    fn test_default_functions() {
        assert_eq!(default_log_dir(), "./logs");
        assert_eq!(default_log_location(), true);
        assert_eq!(default_use_gps(), true);
        assert_eq!(default_upload_dir(), "./uploads");
        assert_eq!(default_min_interval_ms(), 250);
        assert_eq!(default_min_distance_m(), 0.0);
        assert_eq!(default_warning_repeat(), 4);
        assert_eq!(default_replay_path(), "./telemetry.jsonl");
        assert_eq!(default_tick_interval_ms(), 100);
        assert_eq!(default_provider_enabled(), true);
    }
}
