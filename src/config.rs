//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::Deserialize;
use serde::de::Error;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, StationError};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub serial: SerialConfig,
    pub poll: PollConfig,
    pub persistence: PersistenceConfig,
    pub logging: LoggingConfig,
}

/// Serial link configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    #[serde(default = "default_command_terminator")]
    pub command_terminator: String,
}

/// Poll driver configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PollConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,

    #[serde(default)]
    pub dashboard_path: Option<String>,
}

/// CSV persistence configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PersistenceConfig {
    #[serde(default = "default_persistence_enabled")]
    pub enabled: bool,

    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default)]
    pub autosave_interval_ms: u64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub log_dir: Option<String>,
}

// Default value functions
fn default_serial_port() -> String { "auto".to_string() }
fn default_baud_rate() -> u32 { 115200 }
fn default_read_timeout_ms() -> u64 { 5000 }
fn default_command_terminator() -> String { "\n".to_string() }

fn default_poll_interval_ms() -> u64 { 1000 }

fn default_persistence_enabled() -> bool { true }
fn default_data_dir() -> String { "./data".to_string() }

fn default_log_level() -> String { "info".to_string() }

const VALID_BAUD_RATES: [u32; 8] = [9600, 19200, 38400, 57600, 115200, 230400, 460800, 921600];
const VALID_TERMINATORS: [&str; 3] = ["", "\n", "\r\n"];
const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

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
    /// use payload_station::config::Config;
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
        if self.serial.port.is_empty() {
            return Err(invalid("serial port cannot be empty"));
        }

        if !VALID_BAUD_RATES.contains(&self.serial.baud_rate) {
            return Err(invalid(
                "baud_rate must be one of: 9600, 19200, 38400, 57600, 115200, 230400, 460800, 921600",
            ));
        }

        if self.serial.read_timeout_ms == 0 || self.serial.read_timeout_ms > 600_000 {
            return Err(invalid("read_timeout_ms must be between 1 and 600000"));
        }

        if !VALID_TERMINATORS.contains(&self.serial.command_terminator.as_str()) {
            return Err(invalid("command_terminator must be \"\", \"\\n\" or \"\\r\\n\""));
        }

        if self.poll.interval_ms < 10 || self.poll.interval_ms > 60_000 {
            return Err(invalid("poll interval_ms must be between 10 and 60000"));
        }

        if matches!(&self.poll.dashboard_path, Some(path) if path.is_empty()) {
            return Err(invalid("dashboard_path cannot be empty when set"));
        }

        if self.persistence.enabled && self.persistence.data_dir.is_empty() {
            return Err(invalid("persistence data_dir cannot be empty when enabled"));
        }

        let autosave = self.persistence.autosave_interval_ms;
        if autosave != 0 && !(1_000..=3_600_000).contains(&autosave) {
            return Err(invalid("autosave_interval_ms must be 0 (manual) or between 1000 and 3600000"));
        }

        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(invalid("log level must be one of: trace, debug, info, warn, error"));
        }

        if matches!(&self.logging.log_dir, Some(dir) if dir.is_empty()) {
            return Err(invalid("log_dir cannot be empty when set"));
        }

        Ok(())
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl PersistenceConfig {
    /// Autosave period, or `None` when saving is manual only
    pub fn autosave_interval(&self) -> Option<Duration> {
        if self.enabled && self.autosave_interval_ms > 0 {
            Some(Duration::from_millis(self.autosave_interval_ms))
        } else {
            None
        }
    }
}

fn invalid(msg: &str) -> StationError {
    StationError::Config(toml::de::Error::custom(msg))
}
