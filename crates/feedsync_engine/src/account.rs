//! Account configuration and its single owner.

use feedsync_api::{Capabilities, Credentials};
use feedsync_core::AccountId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Server endpoint, credentials, and the negotiated capability set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Base URL of the server, e.g. `https://cloud.example.com`.
    pub server_url: String,
    /// Credentials.
    pub credentials: Credentials,
    /// Capabilities from the last successful validation.
    #[serde(default)]
    pub capabilities: Option<Capabilities>,
}

impl AccountConfig {
    /// Creates an unvalidated configuration.
    pub fn new(server_url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            server_url: server_url.into().trim_end_matches('/').to_string(),
            credentials,
            capabilities: None,
        }
    }

    /// Sets the negotiated capabilities.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    /// Returns the id of the account's local store.
    pub fn account_id(&self) -> AccountId {
        AccountId::derive(&self.server_url, &self.credentials.username)
    }

    /// Returns true if the account has been validated.
    pub fn is_validated(&self) -> bool {
        self.capabilities.is_some()
    }
}

/// Owner of the active [`AccountConfig`].
///
/// Readers take cheap snapshots; only the account validator replaces the
/// configuration, and only after a successful probe.
#[derive(Debug)]
pub struct AccountHandle {
    current: RwLock<Arc<AccountConfig>>,
}

impl AccountHandle {
    /// Wraps the configuration supplied at startup.
    pub fn new(config: AccountConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// Returns the active configuration.
    pub fn snapshot(&self) -> Arc<AccountConfig> {
        Arc::clone(&self.current.read())
    }

    /// Returns the active capabilities, if validated.
    pub fn capabilities(&self) -> Option<Capabilities> {
        self.current.read().capabilities.clone()
    }

    pub(crate) fn commit(&self, config: AccountConfig) {
        info!(
            server = %config.server_url,
            user = %config.credentials.username,
            "account configuration updated"
        );
        *self.current.write() = Arc::new(config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedsync_api::ServerVersion;

    #[test]
    fn account_id_ignores_trailing_slash() {
        let a = AccountConfig::new("https://cloud.example.com/", Credentials::new("alice", "x"));
        let b = AccountConfig::new("https://cloud.example.com", Credentials::new("alice", "y"));
        assert_eq!(a.account_id(), b.account_id());
        assert_eq!(a.server_url, "https://cloud.example.com");
    }

    #[test]
    fn snapshots_survive_commit() {
        let handle = AccountHandle::new(AccountConfig::new(
            "https://cloud.example.com",
            Credentials::new("alice", "secret"),
        ));
        let before = handle.snapshot();
        assert!(!before.is_validated());

        let caps = Capabilities::for_version(ServerVersion::new(18, 0, 0));
        handle.commit((*before).clone().with_capabilities(caps.clone()));

        assert!(!before.is_validated());
        assert_eq!(handle.capabilities(), Some(caps));
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = AccountConfig::new("https://cloud.example.com", Credentials::new("a", "b"))
            .with_capabilities(Capabilities::default());
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(serde_json::from_str::<AccountConfig>(&json).unwrap(), config);
    }
}
