//! # Error Types
//!
//! Custom error types for dashtap using `thiserror`.

use thiserror::Error;

/// Main error type for dashtap
#[derive(Debug, Error)]
pub enum DashtapError {
    /// Explicit protocol selection named a protocol with no registered decoder
    #[error("unknown protocol: {0}")]
    UnknownProtocol(String),

    /// Session lifecycle misuse (e.g. ingest while idle, double start)
    #[error("session error: {0}")]
    Session(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Serial port errors
    #[error("serial error: {0}")]
    Serial(String),

    /// No usable serial port among the candidate paths
    #[error("serial port not found, tried: {0}")]
    SerialPortNotFound(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for dashtap
pub type Result<T> = std::result::Result<T, DashtapError>;
