//! Account validation.
//!
//! The validator probes a candidate [`AccountConfig`] for reachability,
//! authentication, and a supported API version. Only a successful probe
//! touches the [`AccountHandle`]; a failed one leaves the previous working
//! configuration in place.

use crate::account::{AccountConfig, AccountHandle};
use crate::error::SyncError;
use feedsync_api::{
    ApiClient, ApiError, Capabilities, HttpClient, ServerVersion, DEFAULT_TIMEOUT,
    MIN_SERVER_VERSION,
};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of probing an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    /// The account works; these are the server's capabilities.
    Valid(Capabilities),
    /// The server refused the credentials.
    InvalidCredentials,
    /// The server is older than the oldest supported version.
    UnsupportedVersion {
        /// Version the server reported.
        found: ServerVersion,
        /// Oldest supported version.
        required: ServerVersion,
    },
    /// The server could not be reached or is not a News server.
    Unreachable(String),
}

impl Validation {
    /// Returns true for [`Validation::Valid`].
    pub fn is_valid(&self) -> bool {
        matches!(self, Validation::Valid(_))
    }

    /// Converts a failed validation into the error that aborts a cycle.
    pub fn into_error(self) -> Option<SyncError> {
        match self {
            Validation::Valid(_) => None,
            Validation::InvalidCredentials => Some(SyncError::Authentication { status: 401 }),
            Validation::UnsupportedVersion { found, required } => Some(SyncError::configuration(
                format!("server version {found} is older than {required}"),
            )),
            Validation::Unreachable(reason) => Some(SyncError::configuration(format!(
                "server unreachable: {reason}"
            ))),
        }
    }
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Validation::Valid(caps) => write!(f, "valid (server {})", caps.version),
            Validation::InvalidCredentials => f.write_str("invalid credentials"),
            Validation::UnsupportedVersion { found, required } => {
                write!(f, "unsupported server version {found} (need {required})")
            }
            Validation::Unreachable(reason) => write!(f, "unreachable: {reason}"),
        }
    }
}

/// Probes accounts and commits validated configurations.
pub struct AccountValidator<C: HttpClient> {
    http: C,
    timeout: Duration,
}

impl<C: HttpClient> AccountValidator<C> {
    /// Creates a validator sending requests through `http`.
    pub fn new(http: C) -> Self {
        Self {
            http,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Probes `candidate` without committing anything.
    pub fn probe(&self, candidate: &AccountConfig) -> Validation {
        let url = candidate.server_url.as_str();
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Validation::Unreachable(format!("invalid server URL {url:?}"));
        }
        if candidate.credentials.username.is_empty() {
            return Validation::InvalidCredentials;
        }

        let api = ApiClient::new(url, candidate.credentials.clone(), &self.http)
            .with_timeout(self.timeout);

        let version = match api.version() {
            Ok(version) => version,
            Err(err) => return classify(err),
        };
        if version < MIN_SERVER_VERSION {
            return Validation::UnsupportedVersion {
                found: version,
                required: MIN_SERVER_VERSION,
            };
        }

        let mut capabilities = Capabilities::for_version(version);
        match api.status() {
            Ok(status) => {
                if status.cron_warning {
                    warn!(server = url, "server reports a misconfigured update job");
                }
                capabilities =
                    capabilities.with_warnings(status.cron_warning, status.db_charset_warning);
            }
            Err(ApiError::Authentication { .. }) => return Validation::InvalidCredentials,
            Err(err) => debug!(error = %err, "status unavailable, assuming no warnings"),
        }

        Validation::Valid(capabilities)
    }

    /// Probes `candidate` and, if valid, commits it with its capabilities.
    ///
    /// Safe to call at any time; a failed probe leaves `handle` unchanged.
    pub fn validate(&self, candidate: &AccountConfig, handle: &AccountHandle) -> Validation {
        let outcome = self.probe(candidate);
        match &outcome {
            Validation::Valid(capabilities) => {
                let unchanged = {
                    let current = handle.snapshot();
                    current.server_url == candidate.server_url
                        && current.credentials == candidate.credentials
                        && current.capabilities.as_ref() == Some(capabilities)
                };
                if !unchanged {
                    handle.commit(candidate.clone().with_capabilities(capabilities.clone()));
                }
                info!(server = %candidate.server_url, version = %capabilities.version, "account validated");
            }
            failed => warn!(server = %candidate.server_url, outcome = %failed, "account validation failed"),
        }
        outcome
    }
}

fn classify(err: ApiError) -> Validation {
    match err {
        ApiError::Authentication { .. } => Validation::InvalidCredentials,
        ApiError::Network { message, .. } => Validation::Unreachable(message),
        ApiError::ServerRejected { status: 404, .. } => {
            Validation::Unreachable("no News API at this address".to_string())
        }
        ApiError::ServerRejected { status, reason, .. } => {
            Validation::Unreachable(format!("HTTP {status}: {reason}"))
        }
        ApiError::Parse { message } | ApiError::InvalidParameters { message } => {
            Validation::Unreachable(message)
        }
    }
}
