//! # Error Types
//!
//! Custom error types for botctl using `thiserror`.
//!
//! These cover operational failures (config, serial, I/O). The sticky
//! safety taxonomy lives in [`crate::safety::SystemError`]: it is domain
//! state consumed by the arming logic, never propagated up a call chain.

use thiserror::Error;

/// Main error type for botctl
#[derive(Debug, Error)]
pub enum BotctlError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Serial port errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// No receiver device found on any candidate path
    #[error("No CRSF receiver found (tried: {0})")]
    SerialPortNotFound(String),

    /// Telemetry record serialization errors
    #[error("Telemetry error: {0}")]
    Telemetry(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for botctl
pub type Result<T> = std::result::Result<T, BotctlError>;
