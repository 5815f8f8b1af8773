//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::Deserialize;
use serde::de::Error;
use std::fs;
use std::path::Path;

use crate::error::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub serial: SerialConfig,
    pub channels: ChannelConfig,
    pub safety: SafetyConfig,
    pub control: ControlConfig,
    pub telemetry: TelemetryConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    /// Receiver device path; empty means probe the default candidates
    #[serde(default)]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

/// Channel post-processing configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ChannelConfig {
    #[serde(default = "default_deadband")]
    pub deadband: f32,
}

/// Safety configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SafetyConfig {
    #[serde(default = "default_link_timeout_ms")]
    pub link_timeout_ms: u64,

    #[serde(default = "default_switch_debounce_ms")]
    pub switch_debounce_ms: u64,

    #[serde(default = "default_arm_throttle_threshold")]
    pub arm_throttle_threshold: f32,

    #[serde(default = "default_rearm_throttle_threshold")]
    pub rearm_throttle_threshold: f32,

    #[serde(default = "default_watchdog_timeout_ms")]
    pub watchdog_timeout_ms: u64,

    #[serde(default = "default_watchdog_marker_path")]
    pub watchdog_marker_path: String,
}

/// Control loop configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ControlConfig {
    #[serde(default = "default_loop_rate_hz")]
    pub loop_rate_hz: u32,

    #[serde(default = "default_telemetry_frame_interval_ms")]
    pub telemetry_frame_interval_ms: u64,
}

/// Telemetry logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_enabled")]
    pub enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,

    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_baud_rate() -> u32 { 420000 }

fn default_deadband() -> f32 { 0.05 }

fn default_link_timeout_ms() -> u64 { 200 }
fn default_switch_debounce_ms() -> u64 { 50 }
fn default_arm_throttle_threshold() -> f32 { 0.10 }
fn default_rearm_throttle_threshold() -> f32 { 0.05 }
fn default_watchdog_timeout_ms() -> u64 { 500 }
fn default_watchdog_marker_path() -> String { "/tmp/botctl-watchdog-reset".to_string() }

fn default_loop_rate_hz() -> u32 { 100 }
fn default_telemetry_frame_interval_ms() -> u64 { 1000 }

fn default_telemetry_enabled() -> bool { true }
fn default_log_dir() -> String { "./logs".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }
fn default_log_format() -> String { "jsonl".to_string() }

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
    /// use botctl::config::Config;
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
    /// # Returns
    ///
    /// * `Result<()>` - Ok if valid, Err if invalid
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        // Validate baud rate
        if ![115200, 400000, 420000, 921600, 1870000, 3750000].contains(&self.serial.baud_rate) {
            return Err(crate::error::BotctlError::Config(
                toml::de::Error::custom("baud_rate must be one of: 115200, 400000, 420000, 921600, 1870000, 3750000")
            ));
        }

        // Validate deadband
        if self.channels.deadband < 0.0 || self.channels.deadband > 0.25 {
            return Err(crate::error::BotctlError::Config(
                toml::de::Error::custom("deadband must be between 0.0 and 0.25")
            ));
        }

        // Validate timing fields
        if self.safety.link_timeout_ms == 0 || self.safety.link_timeout_ms > 10000 {
            return Err(crate::error::BotctlError::Config(
                toml::de::Error::custom("link_timeout_ms must be between 1 and 10000")
            ));
        }

        if self.safety.switch_debounce_ms == 0 || self.safety.switch_debounce_ms > 1000 {
            return Err(crate::error::BotctlError::Config(
                toml::de::Error::custom("switch_debounce_ms must be between 1 and 1000")
            ));
        }

        // Validate throttle thresholds (rearm must sit strictly below arm)
        if self.safety.arm_throttle_threshold <= 0.0 || self.safety.arm_throttle_threshold > 0.5 {
            return Err(crate::error::BotctlError::Config(
                toml::de::Error::custom("arm_throttle_threshold must be between 0.0 (exclusive) and 0.5")
            ));
        }

        if self.safety.rearm_throttle_threshold <= 0.0
            || self.safety.rearm_throttle_threshold >= self.safety.arm_throttle_threshold {
            return Err(crate::error::BotctlError::Config(
                toml::de::Error::custom("rearm_throttle_threshold must be between 0.0 (exclusive) and arm_throttle_threshold (exclusive)")
            ));
        }

        if self.safety.watchdog_marker_path.is_empty() {
            return Err(crate::error::BotctlError::Config(
                toml::de::Error::custom("watchdog_marker_path cannot be empty")
            ));
        }

        // Validate loop rate
        if self.control.loop_rate_hz == 0 || self.control.loop_rate_hz > 1000 {
            return Err(crate::error::BotctlError::Config(
                toml::de::Error::custom("loop_rate_hz must be between 1 and 1000")
            ));
        }

        // Watchdog must tolerate several loop periods of jitter
        let period_ms = 1000 / u64::from(self.control.loop_rate_hz);
        if self.safety.watchdog_timeout_ms < period_ms * 5 {
            return Err(crate::error::BotctlError::Config(
                toml::de::Error::custom("watchdog_timeout_ms must be at least 5 loop periods")
            ));
        }

        if self.control.telemetry_frame_interval_ms == 0
            || self.control.telemetry_frame_interval_ms > 60000 {
            return Err(crate::error::BotctlError::Config(
                toml::de::Error::custom("telemetry_frame_interval_ms must be between 1 and 60000")
            ));
        }

        // Validate telemetry configuration
        if self.telemetry.enabled && self.telemetry.log_dir.is_empty() {
            return Err(crate::error::BotctlError::Config(
                toml::de::Error::custom("telemetry log_dir cannot be empty when enabled")
            ));
        }

        if self.telemetry.max_records_per_file == 0 {
            return Err(crate::error::BotctlError::Config(
                toml::de::Error::custom("max_records_per_file must be greater than 0")
            ));
        }

        if self.telemetry.max_files_to_keep == 0 {
            return Err(crate::error::BotctlError::Config(
                toml::de::Error::custom("max_files_to_keep must be greater than 0")
            ));
        }

        // Validate log format
        if self.telemetry.format != "jsonl" {
            return Err(crate::error::BotctlError::Config(
                toml::de::Error::custom("log format must be 'jsonl' (only supported format)")
            ));
        }

        Ok(())
    }
}
