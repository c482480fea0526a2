//! Storage backend trait.

use super::StorageResult;

/// An append-only byte store holding one account's journal.
///
/// # Invariants
///
/// - `append` returns the offset where the data starts
/// - `read_all` returns every byte appended since the last `replace`
/// - after `sync` returns, appended data survives process termination
/// - `replace` is all-or-nothing: readers see the old bytes or the new ones
pub trait StorageBackend: Send + Sync {
    /// Reads the whole journal.
    fn read_all(&self) -> StorageResult<Vec<u8>>;

    /// Appends data and returns the offset it was written at.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Makes all appended data durable.
    fn sync(&mut self) -> StorageResult<()>;

    /// Current size in bytes.
    fn size(&self) -> StorageResult<u64>;

    /// Drops everything after `new_size`. Used to cut a torn trailing record.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Atomically replaces the full contents. Used by journal compaction.
    fn replace(&mut self, data: &[u8]) -> StorageResult<()>;
}
