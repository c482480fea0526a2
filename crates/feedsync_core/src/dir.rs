//! Store directory management.
//!
//! Each account gets its own directory under the data root:
//!
//! ```text
//! <root>/<account-id>/
//! ├─ LOCK          # Advisory lock for single-writer
//! └─ journal.log   # Committed transactions and snapshots
//! ```

use crate::error::{StoreError, StoreResult};
use crate::model::AccountId;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const JOURNAL_FILE: &str = "journal.log";

/// An account's store directory, held under an exclusive lock.
///
/// Only one `StoreDir` can exist per directory at a time, across processes.
#[derive(Debug)]
pub struct StoreDir {
    path: PathBuf,
    _lock_file: File,
}

impl StoreDir {
    /// Opens (or creates) the directory for `account` under `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - Another process holds the lock (returns `Locked`)
    /// - I/O errors occur
    pub fn open(root: &Path, account: &AccountId, create_if_missing: bool) -> StoreResult<Self> {
        let path = root.join(account.as_str());

        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(&path)?;
            } else {
                return Err(StoreError::invalid(format!(
                    "store directory does not exist: {}",
                    path.display()
                )));
            }
        }

        if !path.is_dir() {
            return Err(StoreError::invalid(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StoreError::Locked);
        }

        Ok(Self {
            path,
            _lock_file: lock_file,
        })
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of the journal file.
    #[must_use]
    pub fn journal_path(&self) -> PathBuf {
        self.path.join(JOURNAL_FILE)
    }
}
