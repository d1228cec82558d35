//! Core error types for focuswall-core.
//!
//! The hierarchy follows the failure classes the session engine cares about:
//! usage errors raised synchronously (timer), OS/process errors from the
//! filter manager, persistence and configuration failures, and the remote
//! update check whose network failures are classified separately.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for focuswall-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Timer usage errors
    #[error("Timer error: {0}")]
    Timer(#[from] TimerError),

    /// Website filter errors
    #[error("Filter error: {0}")]
    Filter(#[from] FilterError),

    /// Update check errors
    #[error("Update check error: {0}")]
    Update(#[from] UpdateError),

    /// A record addressed by id does not exist
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The requested change is locked while a session is running
    #[error("Cannot {action} while a session is active")]
    SessionActive { action: &'static str },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Stored value could not be decoded
    #[error("Corrupt value in column '{column}': {message}")]
    Corrupt { column: &'static str, message: String },

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Data directory could not be resolved or created
    #[error("Failed to prepare data directory {path}: {message}")]
    DataDir { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Unknown dot-path key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Numeric setting outside its allowed range
    #[error("'{field}' must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: u32,
        max: u32,
        value: u32,
    },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Timer usage errors. These are programming errors on the caller's side.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TimerError {
    /// Skip requested while no duration is armed or running
    #[error("Cannot skip: no duration is running or waiting")]
    SkipWhileIdle,
}

/// Website filter process and proxy errors.
#[derive(Error, Debug)]
pub enum FilterError {
    /// The external filtering process could not be spawned
    #[error("Failed to spawn filter process '{binary}': {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// Writing the rule script failed
    #[error("Failed to write rule script to {path}: {source}")]
    Script {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An OS proxy command failed or timed out
    #[error("System proxy command '{command}' failed: {message}")]
    ProxyCommand { command: String, message: String },

    /// Proxy registration is not available on this platform
    #[error("System proxy registration is not supported on this platform")]
    ProxyUnsupported,

    /// The background worker has already been shut down
    #[error("Filter worker is no longer running")]
    WorkerGone,
}

/// Remote version check errors.
#[derive(Error, Debug)]
pub enum UpdateError {
    /// Host unreachable, connection refused or timed out
    #[error("Network unreachable: {0}")]
    NetworkUnreachable(String),

    /// Any other failure (HTTP status, malformed document, bad version)
    #[error("Update check failed: {0}")]
    Failed(String),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _msg) => {
                if code.code == rusqlite::ErrorCode::DatabaseLocked {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

impl From<reqwest::Error> for UpdateError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            UpdateError::NetworkUnreachable(err.to_string())
        } else {
            UpdateError::Failed(err.to_string())
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
