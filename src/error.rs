//! Error types for vtrack

use thiserror::Error;

/// Main error type for vtrack
#[derive(Error, Debug)]
pub enum VtrackError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Tracker error: {0}")]
    Tracker(#[from] TrackerError),

    #[error("Sender error: {0}")]
    Sender(#[from] SenderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadFile(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid configuration value: {field} - {message}")]
    InvalidValue { field: String, message: String },
}

/// Tracker lifecycle and per-frame errors.
///
/// The lifecycle variants are stable values: callers can match on
/// `AlreadyRunning`, `NotRunning`, and `AlreadyClosed` to branch on the
/// exact violation.
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("tracker is already running")]
    AlreadyRunning,

    #[error("tracker is not running")]
    NotRunning,

    #[error("tracker is closed")]
    AlreadyClosed,

    #[error("cannot {operation}: tracker is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("camera read failed: {0}")]
    Capture(String),

    #[error("landmark detection failed: {0}")]
    Detection(String),

    #[error("closing tracker: {0}")]
    Teardown(String),
}

/// Protocol sender errors
#[derive(Error, Debug)]
pub enum SenderError {
    #[error("resolving VMC address {addr}: {source}")]
    Resolve {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connecting to VMC endpoint {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("sending {what}: {source}")]
    Write {
        what: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for vtrack operations
pub type Result<T> = std::result::Result<T, VtrackError>;
