//! Feed store error types
//!
//! Every backend maps its native failures into this taxonomy so callers can
//! react the same way regardless of where records live.

use thiserror::Error;

/// Errors that can occur in a feed store
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend cannot be reached (file unreadable, connection refused, lock poisoned)
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Backend rejected or failed a write
    #[error("Storage write failed: {0}")]
    WriteFailed(String),

    /// Update target does not exist (only raised by backends that can tell)
    #[error("Feed not found: {0}")]
    RecordNotFound(String),

    /// Persisted content does not parse into valid records
    #[error("Corrupt data: {0}")]
    CorruptData(String),

    /// Configuration error (unknown backend, missing URL)
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StorageError {
    /// True when the failure means persisted content is unreadable
    pub fn is_corrupt(&self) -> bool {
        matches!(self, StorageError::CorruptData(_))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::CorruptData(err.to_string())
    }
}

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
