//! Error types for API request objects.

use thiserror::Error;

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors a request object can report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The request never got an HTTP response (connection, TLS, timeout).
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
        /// HTTP status code (401 or 403).
        status: u16,
    },

    /// The server answered with an error status.
    #[error("server rejected request (HTTP {status}): {reason}")]
    ServerRejected {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the response, or the status text.
        reason: String,
        /// Whether repeating the request may succeed.
        retryable: bool,
    },

    /// The response body did not match the expected shape.
    #[error("parse error: {message}")]
    Parse {
        /// Error message.
        message: String,
    },

    /// The typed parameters cannot form a valid request.
    #[error("invalid parameters: {message}")]
    InvalidParameters {
        /// Error message.
        message: String,
    },
}

impl ApiError {
    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            timed_out: false,
        }
    }

    /// Creates a network error for an elapsed timeout.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            timed_out: true,
        }
    }

    /// Creates a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Creates an invalid-parameters error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidParameters {
            message: message.into(),
        }
    }

    /// Classifies a non-success HTTP status.
    ///
    /// 401/403 are authentication failures; 408, 429 and 5xx are transient;
    /// every other status is a permanent rejection.
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 | 403 => Self::Authentication { status },
            _ => Self::ServerRejected {
                status,
                reason: rejection_reason(status, body),
                retryable: matches!(status, 408 | 429 | 500..=599),
            },
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Network { .. } => true,
            ApiError::ServerRejected { retryable, .. } => *retryable,
            ApiError::Authentication { .. }
            | ApiError::Parse { .. }
            | ApiError::InvalidParameters { .. } => false,
        }
    }

    /// Returns the HTTP status, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Authentication { status } | ApiError::ServerRejected { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

/// Extracts `{"message": ".."}` from an error body, falling back to the status.
fn rejection_reason(status: u16, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("message")?.as_str().map(str::to_string))
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| format!("HTTP status {status}"))
}
