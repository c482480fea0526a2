//! Store configuration.

/// Configuration for opening a store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Whether to create the store directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to fsync the journal on every commit (safer but slower).
    pub sync_on_commit: bool,

    /// Journal size in bytes above which the journal is compacted into a snapshot.
    pub compaction_threshold: u64,

    /// Minimum number of records since the last snapshot before compacting.
    pub compaction_min_records: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_commit: true,
            compaction_threshold: 4 * 1024 * 1024, // 4 MB
            compaction_min_records: 64,
        }
    }
}

impl StoreConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the store directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to fsync the journal on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets the journal size that triggers compaction.
    #[must_use]
    pub const fn compaction_threshold(mut self, bytes: u64) -> Self {
        self.compaction_threshold = bytes;
        self
    }

    /// Sets the minimum record count before compaction is considered.
    #[must_use]
    pub const fn compaction_min_records(mut self, records: u64) -> Self {
        self.compaction_min_records = records;
        self
    }
}
