//! Error types for revstore
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! ## Classification
//!
//! - **Guarded mutation**: `UnsupportedOperation` is returned before any row is
//!   written. Retrying is pointless, the operation will never be supported.
//! - **Fatal**: `InvariantViolation` means the logs disagree with each other
//!   (corruption or a race the backend failed to prevent). Never retried.
//! - **Transient**: `Storage` is propagated unchanged. Retry policy belongs to
//!   the caller.

use crate::contract::RevisionNumber;
use crate::types::EntityId;
use std::io;
use thiserror::Error;

/// Result type alias for revstore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the revision store
#[derive(Debug, Error)]
pub enum Error {
    /// Update or delete attempted on an append-only log, or a save with a
    /// mode other than insert
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// The logs are mutually inconsistent
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// No revision at or below the requested number exists for the entity
    #[error("No revision of {entity} at or before revision {revision}")]
    NotFound {
        /// Entity that was looked up
        entity: EntityId,
        /// Upper bound of the lookup
        revision: RevisionNumber,
    },

    /// A row with the same primary key already exists
    #[error("Duplicate key in {table}: {key}")]
    DuplicateKey {
        /// Table name
        table: &'static str,
        /// Rendered key
        key: String,
    },

    /// Backing store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A batched save failed part way through
    #[error("Batch save aborted after {committed} committed entities: {source}")]
    BatchAborted {
        /// Number of entities whose batches were committed before the failure
        committed: usize,
        /// Failure of the aborted batch
        #[source]
        source: Box<Error>,
    },

    /// I/O error (configuration files)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Create an `UnsupportedOperation` error
    pub fn unsupported(message: impl Into<String>) -> Self {
        Error::UnsupportedOperation(message.into())
    }

    /// Create an `InvariantViolation` error
    pub fn invariant(message: impl Into<String>) -> Self {
        Error::InvariantViolation(message.into())
    }

    /// Create an `InvalidInput` error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Error::InvalidInput(message.into())
    }

    /// Create a `Storage` error
    pub fn storage(message: impl Into<String>) -> Self {
        Error::Storage(message.into())
    }

    /// Create a `Config` error
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    /// True for errors that indicate corrupted or inconsistent history
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::InvariantViolation(_) => true,
            Error::BatchAborted { source, .. } => source.is_fatal(),
            _ => false,
        }
    }

    /// True for errors a caller may reasonably retry
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Storage(_) | Error::Io(_) => true,
            Error::BatchAborted { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_error_display_unsupported() {
        let err = Error::unsupported("delete on entity revision log");
        let msg = err.to_string();
        assert!(msg.contains("Unsupported operation"));
        assert!(msg.contains("delete on entity revision log"));
    }

    #[test]
    fn test_error_display_not_found() {
        let entity = EntityId::new(Uuid::nil(), "Concept", Uuid::nil());
        let err = Error::NotFound {
            entity,
            revision: RevisionNumber::new(7),
        };
        let msg = err.to_string();
        assert!(msg.contains("Concept"));
        assert!(msg.contains('7'));
    }

    #[test]
    fn test_invariant_is_fatal_and_not_retryable() {
        let err = Error::invariant("revision 3 has no metadata");
        assert!(err.is_fatal());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_storage_is_retryable() {
        let err = Error::storage("connection reset");
        assert!(err.is_retryable());
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_batch_aborted_classifies_by_source() {
        let err = Error::BatchAborted {
            committed: 5000,
            source: Box::new(Error::storage("timeout")),
        };
        assert!(err.is_retryable());
        assert!(err.to_string().contains("5000"));

        let fatal = Error::BatchAborted {
            committed: 0,
            source: Box::new(Error::invariant("missing metadata")),
        };
        assert!(fatal.is_fatal());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
