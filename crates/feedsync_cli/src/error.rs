//! CLI error type.

use feedsync_core::StoreError;
use feedsync_engine::SyncError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// No account has been configured in the data directory.
    #[error("no account configured in {0} (run `feedsync account set`)")]
    NoAccount(PathBuf),

    /// The account was rejected by the server.
    #[error("account rejected: {0}")]
    Rejected(String),

    /// Reading or writing a CLI file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The account file could not be encoded or decoded.
    #[error("account file error: {0}")]
    Json(#[from] serde_json::Error),

    /// The local store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A sync cycle failed.
    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;
