//! Error types for sparkify-etl
//!
//! Severity follows the pipeline's recovery rules:
//! - [`ParseError`] / [`BuildError`]: the record is skipped and logged, the unit continues
//! - [`StoreError::Retriable`]: the unit is retried with backoff
//! - [`StoreError::Fatal`] / [`StoreError::Timeout`]: the unit fails, the run continues
//! - [`EtlError::Configuration`]: the run aborts before discovery

use crate::models::RecordKind;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Malformed raw record
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParseError {
    /// Line is not valid UTF-8
    #[error("invalid UTF-8 after byte {0}")]
    InvalidUtf8(usize),

    /// Line is not valid JSON
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// Valid JSON that is not an object
    #[error("expected a JSON object, found {0}")]
    NotAnObject(&'static str),

    /// Required field absent or of the wrong type
    #[error("{kind} record rejected: {message}")]
    Record { kind: RecordKind, message: String },

    /// Field present with an out-of-range value
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: &'static str, message: String },
}

/// A typed record that cannot produce its row
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BuildError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("timestamp out of range: {0} ms")]
    InvalidTimestamp(i64),
}

/// Target store failure, flagged retriable or not
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    /// Transient failure (lock contention, pool exhaustion, I/O hiccup)
    #[error("retriable store error: {0}")]
    Retriable(String),

    /// Permanent failure for this unit (constraint violation, schema mismatch, ...)
    #[error("fatal store error: {0}")]
    Fatal(String),

    /// Load call exceeded the caller-supplied timeout
    #[error("load timed out after {0:?}")]
    Timeout(Duration),
}

impl StoreError {
    pub fn is_retriable(&self) -> bool {
        matches!(self, StoreError::Retriable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if is_transient_sqlx(&err) {
            StoreError::Retriable(err.to_string())
        } else {
            StoreError::Fatal(err.to_string())
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut => {
                StoreError::Retriable(err.to_string())
            }
            _ => StoreError::Fatal(err.to_string()),
        }
    }
}

impl From<sparkify_common::Error> for StoreError {
    fn from(err: sparkify_common::Error) -> Self {
        match err {
            sparkify_common::Error::Database(e) => e.into(),
            sparkify_common::Error::Io(e) => e.into(),
            other => StoreError::Fatal(other.to_string()),
        }
    }
}

impl From<parquet::errors::ParquetError> for StoreError {
    fn from(err: parquet::errors::ParquetError) -> Self {
        StoreError::Fatal(format!("parquet: {}", err))
    }
}

impl From<arrow_schema::ArrowError> for StoreError {
    fn from(err: arrow_schema::ArrowError) -> Self {
        StoreError::Fatal(format!("arrow: {}", err))
    }
}

/// SQLite BUSY (5) / LOCKED (6), including extended codes, and connection-level failures
fn is_transient_sqlx(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db_err) => {
            let message = db_err.message();
            if message.contains("database is locked") || message.contains("database is busy") {
                return true;
            }
            db_err
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .map(|code| matches!(code & 0xff, 5 | 6))
                .unwrap_or(false)
        }
        _ => false,
    }
}

/// Raw-record source failure
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown source item: {0}")]
    UnknownItem(String),
}

/// Top-level pipeline error
#[derive(Debug, Error)]
pub enum EtlError {
    /// Missing or unusable source/target; raised before discovery
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Common error: {0}")]
    Common(sparkify_common::Error),
}

impl From<sparkify_common::Error> for EtlError {
    fn from(err: sparkify_common::Error) -> Self {
        match err {
            sparkify_common::Error::Config(message) => EtlError::Configuration(message),
            other => EtlError::Common(other),
        }
    }
}

/// Result type for pipeline operations
pub type EtlResult<T> = Result<T, EtlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable_flag() {
        assert!(StoreError::Retriable("locked".into()).is_retriable());
        assert!(!StoreError::Fatal("constraint".into()).is_retriable());
        assert!(!StoreError::Timeout(Duration::from_millis(5)).is_retriable());
    }

    #[test]
    fn test_sqlx_pool_timeout_is_retriable() {
        let err: StoreError = sqlx::Error::PoolTimedOut.into();
        assert!(err.is_retriable());
    }

    #[test]
    fn test_sqlx_row_not_found_is_fatal() {
        let err: StoreError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, StoreError::Fatal(_)));
    }

    #[test]
    fn test_io_interrupted_is_retriable() {
        let err: StoreError = std::io::Error::from(std::io::ErrorKind::Interrupted).into();
        assert!(err.is_retriable());

        let err: StoreError = std::io::Error::from(std::io::ErrorKind::PermissionDenied).into();
        assert!(!err.is_retriable());
    }

    #[test]
    fn test_common_config_error_maps_to_configuration() {
        let err: EtlError = sparkify_common::Error::Config("song_data missing".into()).into();
        assert!(matches!(err, EtlError::Configuration(_)));
    }
}
