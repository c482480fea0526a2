//! Error types for the persisted store.

use crate::storage::StorageError;
use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O error outside the storage backend (directory, lock file).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A journal record could not be encoded or decoded.
    #[error("journal codec error: {message}")]
    Codec {
        /// Description of the codec failure.
        message: String,
    },

    /// The journal is damaged beyond the recoverable tail.
    #[error("journal corruption: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Another process holds the store lock.
    #[error("store locked: another process has exclusive access")]
    Locked,

    /// The store belongs to a different account.
    #[error("account mismatch: store belongs to {expected}, got {actual}")]
    AccountMismatch {
        /// Account the store was opened for.
        expected: String,
        /// Account supplied by the caller.
        actual: String,
    },

    /// A referenced row does not exist.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Row kind ("folder", "feed", "article").
        kind: &'static str,
        /// Raw identifier.
        id: i64,
    },

    /// A pending mutation handle is unknown (already confirmed or discarded).
    #[error("unknown mutation handle {0}")]
    UnknownMutation(u64),

    /// The requested change violates a data-model invariant.
    #[error("invalid change: {message}")]
    Invalid {
        /// Description of the violated invariant.
        message: String,
    },
}

impl StoreError {
    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }

    /// Creates an invariant violation error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    pub fn not_found(kind: &'static str, id: i64) -> Self {
        Self::NotFound { kind, id }
    }
}
