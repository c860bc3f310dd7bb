//! Error types for run history storage and migrations.
//!
//! Storage and deserialization failures propagate and abort a migration at
//! its current cursor position. Duplicate-key conflicts on idempotent inserts
//! are recognised with [`RunHistoryError::is_unique_violation`] and swallowed
//! by the writer instead of being surfaced here.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the run history crate.
#[derive(Debug, Error)]
pub enum RunHistoryError {
    // Database errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Lookup errors
    #[error("Run not found: {run_id}")]
    RunNotFound { run_id: String },

    #[error("Unknown data migration: {name}")]
    UnknownMigration { name: String },

    #[error("Migration cancelled")]
    Cancelled,

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for run history operations.
pub type Result<T> = std::result::Result<T, RunHistoryError>;

impl From<std::io::Error> for RunHistoryError {
    fn from(err: std::io::Error) -> Self {
        RunHistoryError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for RunHistoryError {
    fn from(err: serde_json::Error) -> Self {
        RunHistoryError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for RunHistoryError {
    fn from(err: rusqlite::Error) -> Self {
        RunHistoryError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl RunHistoryError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        RunHistoryError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Error used when the shared connection mutex is poisoned.
    pub(crate) fn lock_poisoned(what: &str) -> Self {
        RunHistoryError::Database {
            message: format!("Failed to acquire {} connection lock", what),
            source: None,
        }
    }

    /// Check whether this is a duplicate-key conflict.
    ///
    /// Only unique and primary-key constraint failures qualify. NOT NULL,
    /// CHECK and foreign-key failures are real errors.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            RunHistoryError::Database {
                source: Some(err), ..
            } => is_unique_violation(err),
            _ => false,
        }
    }
}

/// Check whether a rusqlite error is a duplicate-key conflict.
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(code, _) => {
            code.code == rusqlite::ErrorCode::ConstraintViolation
                && matches!(
                    code.extended_code,
                    rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                        | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                )
        }
        _ => false,
    }
}
