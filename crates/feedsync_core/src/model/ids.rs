//! Identifier types.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw identifier.
            #[must_use]
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// Returns the raw identifier.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }

            /// Returns true if this is a local placeholder not yet confirmed by the server.
            #[must_use]
            pub const fn is_placeholder(self) -> bool {
                self.0 < 0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }
    };
}

entity_id!(
    /// Folder identifier. Negative values are local placeholders.
    FolderId
);
entity_id!(
    /// Feed identifier. Negative values are local placeholders.
    FeedId
);
entity_id!(
    /// Article identifier. Always server-assigned.
    ArticleId
);

/// Handle of a queued mutation. Handles grow with creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MutationHandle(u64);

impl MutationHandle {
    /// Wraps a raw handle.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw handle.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MutationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Stable identifier of an account's local store.
///
/// Derived from the server URL and user name, so the same account always
/// maps to the same store directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Derives the identifier for `username` on `server_url`.
    ///
    /// The URL is compared without a trailing slash.
    #[must_use]
    pub fn derive(server_url: &str, username: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(server_url.trim_end_matches('/').as_bytes());
        hasher.update(b"\n");
        hasher.update(username.as_bytes());
        let digest = hasher.finalize();

        let hex = digest[..16]
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<String>();
        Self(hex)
    }

    /// Wraps an already-derived identifier.
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the identifier as used for the store directory name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_detection() {
        assert!(FolderId::new(-1).is_placeholder());
        assert!(!FolderId::new(0).is_placeholder());
        assert!(!FeedId::new(42).is_placeholder());
    }

    #[test]
    fn account_id_ignores_trailing_slash() {
        let a = AccountId::derive("https://cloud.example.com/", "alice");
        let b = AccountId::derive("https://cloud.example.com", "alice");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn account_id_differs_per_user() {
        let a = AccountId::derive("https://cloud.example.com", "alice");
        let b = AccountId::derive("https://cloud.example.com", "bob");
        assert_ne!(a, b);
    }
}
