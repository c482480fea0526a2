//! Error types for the sync engine.

use feedsync_api::ApiError;
use feedsync_core::StoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that abort a sync cycle.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The account is unusable: bad URL, unsupported server, or unreachable at validation.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Network or transport error.
    #[error("network error: {message}")]
    Network {
        /// Error message.
        message: String,
        /// Whether the per-call timeout elapsed.
        timed_out: bool,
    },

    /// The server refused the credentials.
    #[error("authentication failed (HTTP {status})")]
    Authentication {
        /// HTTP status code.
        status: u16,
    },

    /// The server answered with an error status.
    #[error("server rejected request (HTTP {status}): {reason}")]
    ServerRejected {
        /// HTTP status code.
        status: u16,
        /// Server message.
        reason: String,
        /// Whether repeating the request may succeed.
        retryable: bool,
    },

    /// A response did not match the expected shape.
    #[error("parse error: {0}")]
    Parse(String),

    /// The local store failed.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// The cycle was cancelled between phases.
    #[error("sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Returns true if a later cycle may succeed without user action.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Network { .. } => true,
            SyncError::ServerRejected { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Returns the kind reported in error events.
    pub fn kind(&self) -> SyncErrorKind {
        match self {
            SyncError::Configuration(_) => SyncErrorKind::Configuration,
            SyncError::Network { .. } => SyncErrorKind::Network,
            SyncError::Authentication { .. } => SyncErrorKind::Authentication,
            SyncError::ServerRejected { .. } => SyncErrorKind::ServerRejected,
            SyncError::Parse(_) => SyncErrorKind::Parse,
            SyncError::Storage(_) => SyncErrorKind::Storage,
            SyncError::Cancelled => SyncErrorKind::Cancelled,
        }
    }
}

impl From<ApiError> for SyncError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Network { message, timed_out } => SyncError::Network { message, timed_out },
            ApiError::Authentication { status } => SyncError::Authentication { status },
            ApiError::ServerRejected {
                status,
                reason,
                retryable,
            } => SyncError::ServerRejected {
                status,
                reason,
                retryable,
            },
            ApiError::Parse { message } => SyncError::Parse(message),
            ApiError::InvalidParameters { message } => SyncError::Configuration(message),
        }
    }
}

/// Error classification carried by events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncErrorKind {
    /// See [`SyncError::Configuration`].
    Configuration,
    /// See [`SyncError::Network`].
    Network,
    /// See [`SyncError::Authentication`].
    Authentication,
    /// See [`SyncError::ServerRejected`].
    ServerRejected,
    /// See [`SyncError::Parse`].
    Parse,
    /// See [`SyncError::Storage`].
    Storage,
    /// See [`SyncError::Cancelled`].
    Cancelled,
}

impl fmt::Display for SyncErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncErrorKind::Configuration => "configuration",
            SyncErrorKind::Network => "network",
            SyncErrorKind::Authentication => "authentication",
            SyncErrorKind::ServerRejected => "server-rejected",
            SyncErrorKind::Parse => "parse",
            SyncErrorKind::Storage => "storage",
            SyncErrorKind::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::from(ApiError::timeout("slow")).is_retryable());
        assert!(SyncError::from(ApiError::from_status(503, "")).is_retryable());
        assert!(!SyncError::from(ApiError::from_status(422, "")).is_retryable());
        assert!(!SyncError::Authentication { status: 401 }.is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
    }

    #[test]
    fn api_errors_keep_their_kind() {
        let err = SyncError::from(ApiError::from_status(401, ""));
        assert_eq!(err.kind(), SyncErrorKind::Authentication);

        let err = SyncError::from(ApiError::parse("bad json"));
        assert_eq!(err.kind(), SyncErrorKind::Parse);
        assert_eq!(err.to_string(), "parse error: bad json");
    }

    #[test]
    fn storage_errors_convert() {
        let err: SyncError = StoreError::Locked.into();
        assert_eq!(err.kind(), SyncErrorKind::Storage);
        assert_eq!(SyncErrorKind::ServerRejected.to_string(), "server-rejected");
    }
}
