//! Server versions and the negotiated capability set.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A `major.minor.patch` server version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServerVersion {
    /// Major version.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
    /// Patch version.
    pub patch: u32,
}

/// Oldest server version the engine talks to.
pub const MIN_SERVER_VERSION: ServerVersion = ServerVersion::new(8, 8, 0);

/// First server version accepting item ids on the star endpoints.
pub const STAR_BY_ITEM_IDS_SINCE: ServerVersion = ServerVersion::new(15, 1, 0);

impl ServerVersion {
    /// Creates a version.
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parses versions like `"15.1.0"`, `"8.8"`, or `"18.0.1-beta.2"`.
    ///
    /// Missing components count as zero; anything after the leading digits
    /// of a component is ignored.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.trim().split('.');
        let major = leading_number(parts.next()?)?;
        let minor = parts.next().map_or(Some(0), leading_number)?;
        let patch = parts.next().map_or(Some(0), leading_number)?;
        Some(Self::new(major, minor, patch))
    }
}

fn leading_number(part: &str) -> Option<u32> {
    let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// An optional API feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Capability {
    /// Incremental item fetch through `items/updated`.
    ItemsUpdated,
    /// Feed rename endpoint.
    FeedRename,
    /// Star and unstar by item id instead of feed id plus guid hash.
    StarByItemIds,
}

/// What the validated server supports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Server version.
    pub version: ServerVersion,
    /// Supported optional features.
    pub features: BTreeSet<Capability>,
    /// The server reports that its background update job is misconfigured.
    pub cron_warning: bool,
    /// The server reports a database charset problem.
    pub db_charset_warning: bool,
}

impl Capabilities {
    /// Derives the capability set of `version`.
    #[must_use]
    pub fn for_version(version: ServerVersion) -> Self {
        let mut features = BTreeSet::new();
        if version >= MIN_SERVER_VERSION {
            features.insert(Capability::ItemsUpdated);
            features.insert(Capability::FeedRename);
        }
        if version >= STAR_BY_ITEM_IDS_SINCE {
            features.insert(Capability::StarByItemIds);
        }
        Self {
            version,
            features,
            cron_warning: false,
            db_charset_warning: false,
        }
    }

    /// Sets the warning flags reported by the status endpoint.
    #[must_use]
    pub fn with_warnings(mut self, cron: bool, db_charset: bool) -> Self {
        self.cron_warning = cron;
        self.db_charset_warning = db_charset;
        self
    }

    /// Returns true if `capability` is supported.
    #[must_use]
    pub fn supports(&self, capability: Capability) -> bool {
        self.features.contains(&capability)
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::for_version(MIN_SERVER_VERSION)
    }
}
