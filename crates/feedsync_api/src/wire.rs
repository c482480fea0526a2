//! JSON shapes exchanged with the News API.
//!
//! Field names follow the server's camelCase. Every type converts into the
//! matching `feedsync_core` model type.

use feedsync_core::{Article, ArticleId, Feed, FeedId, Folder, FolderId};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A folder as sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireFolder {
    /// Folder id.
    pub id: i64,
    /// Folder name.
    pub name: String,
}

impl From<WireFolder> for Folder {
    fn from(wire: WireFolder) -> Self {
        Folder::new(FolderId::new(wire.id), wire.name)
    }
}

/// A feed as sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireFeed {
    /// Feed id.
    pub id: i64,
    /// Feed document URL.
    pub url: String,
    /// Title.
    #[serde(default)]
    pub title: String,
    /// Favicon URL.
    #[serde(default)]
    pub favicon_link: Option<String>,
    /// Parent folder id; `0` or `null` means no folder.
    #[serde(default)]
    pub folder_id: Option<i64>,
    /// Server-side unread count.
    #[serde(default)]
    pub unread_count: u32,
    /// Website URL.
    #[serde(default)]
    pub link: Option<String>,
}

impl From<WireFeed> for Feed {
    fn from(wire: WireFeed) -> Self {
        let folder = wire.folder_id.filter(|id| *id > 0).map(FolderId::new);
        let title = if wire.title.trim().is_empty() {
            wire.url.clone()
        } else {
            wire.title
        };
        Feed {
            id: FeedId::new(wire.id),
            folder_id: folder,
            url: wire.url,
            title,
            favicon_link: wire.favicon_link.filter(|s| !s.is_empty()),
            link: wire.link.filter(|s| !s.is_empty()),
            unread_count: wire.unread_count,
        }
    }
}

/// An item as sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireItem {
    /// Item id.
    pub id: i64,
    /// Item GUID.
    #[serde(default)]
    pub guid: String,
    /// Hash of the GUID.
    pub guid_hash: String,
    /// Owning feed id.
    pub feed_id: i64,
    /// Title.
    #[serde(default)]
    pub title: Option<String>,
    /// Author.
    #[serde(default)]
    pub author: Option<String>,
    /// Link to the original article.
    #[serde(default)]
    pub url: Option<String>,
    /// HTML body.
    #[serde(default)]
    pub body: Option<String>,
    /// Publication time (unix seconds).
    #[serde(default)]
    pub pub_date: Option<i64>,
    /// Content update time (unix seconds).
    #[serde(default)]
    pub updated_date: Option<i64>,
    /// Change marker. Older servers send a number, newer ones a string.
    #[serde(deserialize_with = "number_or_string")]
    pub last_modified: u64,
    /// Unread flag.
    pub unread: bool,
    /// Starred flag.
    pub starred: bool,
}

impl From<WireItem> for Article {
    fn from(wire: WireItem) -> Self {
        let published = wire.pub_date.unwrap_or_default();
        Article {
            id: ArticleId::new(wire.id),
            feed_id: FeedId::new(wire.feed_id),
            guid_hash: wire.guid_hash,
            title: wire.title.unwrap_or_default(),
            author: wire.author.filter(|s| !s.is_empty()),
            url: wire.url.filter(|s| !s.is_empty()),
            body: wire.body.unwrap_or_default(),
            published_at: published,
            last_modified: wire.updated_date.unwrap_or(published),
            read: !wire.unread,
            starred: wire.starred,
            sync_marker: wire.last_modified,
        }
    }
}

/// `{"version": ".."}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEnvelope {
    /// Version string.
    pub version: String,
}

/// Warning flags of the status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusWarnings {
    /// The background update job is misconfigured.
    #[serde(default)]
    pub improperly_configured_cron: bool,
    /// The database charset is wrong.
    #[serde(default)]
    pub incorrect_db_charset: bool,
}

/// `{"version": "..", "warnings": {..}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEnvelope {
    /// Version string.
    pub version: String,
    /// Warning flags.
    #[serde(default)]
    pub warnings: StatusWarnings,
}

/// `{"folders": [..]}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldersEnvelope {
    /// Folders.
    pub folders: Vec<WireFolder>,
}

/// `{"feeds": [..], "starredCount": .., "newestItemId": ..}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedsEnvelope {
    /// Feeds.
    pub feeds: Vec<WireFeed>,
    /// Number of starred items.
    #[serde(default)]
    pub starred_count: Option<u32>,
    /// Highest item id on the server.
    #[serde(default)]
    pub newest_item_id: Option<i64>,
}

/// `{"items": [..]}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemsEnvelope {
    /// Items.
    pub items: Vec<WireItem>,
}

fn number_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    struct MarkerVisitor;

    impl Visitor<'_> for MarkerVisitor {
        type Value = u64;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a non-negative integer or a string holding one")
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<u64, E> {
            Ok(value)
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<u64, E> {
            u64::try_from(value).map_err(|_| E::custom("negative marker"))
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<u64, E> {
            value.trim().parse().map_err(E::custom)
        }
    }

    deserializer.deserialize_any(MarkerVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_from_json() {
        let json = r#"{
            "id": 3443, "guid": "http://grulja.wordpress.com/?p=76",
            "guidHash": "3059047a572cd9cd5d0bf645faffd077",
            "url": "http://grulja.wordpress.com/2013/04/29/plasma-nm-after-the-solid-sprint/",
            "title": "Plasma-nm after the solid sprint", "author": "Jan Grulich (grulja)",
            "pubDate": 1367270544, "updatedDate": null, "body": "<p>At first I have to say...</p>",
            "feedId": 67, "unread": true, "starred": false, "lastModified": 1367273003
        }"#;
        let article: Article = serde_json::from_str::<WireItem>(json).unwrap().into();
        assert_eq!(article.id, ArticleId::new(3443));
        assert_eq!(article.feed_id, FeedId::new(67));
        assert!(!article.read);
        assert_eq!(article.last_modified, 1367270544);
        assert_eq!(article.sync_marker, 1367273003);
    }

    #[test]
    fn string_marker_is_accepted() {
        let json = r#"{"id": 1, "guidHash": "h", "feedId": 2, "unread": false,
            "starred": true, "lastModified": "1700000000123456"}"#;
        let item: WireItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.last_modified, 1_700_000_000_123_456);
    }

    #[test]
    fn feed_without_folder() {
        let json = r#"{"id": 39, "url": "http://feeds.feedburner.com/oatmealfeed",
            "title": "", "faviconLink": "", "folderId": 0, "unreadCount": 9}"#;
        let feed: Feed = serde_json::from_str::<WireFeed>(json).unwrap().into();
        assert_eq!(feed.folder_id, None);
        assert_eq!(feed.title, "http://feeds.feedburner.com/oatmealfeed");
        assert_eq!(feed.favicon_link, None);
    }
}
