//! Byte-level storage for the store journal.
//!
//! Backends are opaque byte stores. They know nothing about journal
//! records; [`crate::journal`] owns the framing and the record format.
//!
//! - [`MemoryBackend`] keeps the journal in a shared buffer (tests, ephemeral stores)
//! - [`FileBackend`] keeps it in a file and replaces it atomically on compaction

mod backend;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use file::FileBackend;
pub use memory::MemoryBackend;

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to truncate beyond the end of storage.
    #[error("cannot truncate to {requested} bytes, storage holds {size}")]
    TruncatePastEnd {
        /// Requested length.
        requested: u64,
        /// Current length.
        size: u64,
    },
}
