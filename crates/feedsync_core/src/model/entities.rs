//! Folders, feeds, and articles.

use super::ids::{ArticleId, FeedId, FolderId};
use serde::{Deserialize, Serialize};

/// A folder grouping feeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    /// Server-assigned id, or a placeholder until the create is confirmed.
    pub id: FolderId,
    /// Display name. Never empty.
    pub name: String,
}

impl Folder {
    /// Creates a folder.
    pub fn new(id: FolderId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// A subscribed feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feed {
    /// Server-assigned id, or a placeholder until the create is confirmed.
    pub id: FeedId,
    /// Parent folder; `None` means "no folder".
    pub folder_id: Option<FolderId>,
    /// Source URL of the feed document.
    pub url: String,
    /// Display title.
    pub title: String,
    /// Favicon reference.
    pub favicon_link: Option<String>,
    /// Website the feed belongs to.
    pub link: Option<String>,
    /// Cached number of unread articles, derived from local article state.
    pub unread_count: u32,
}

impl Feed {
    /// Creates a feed with no favicon, link, or unread articles.
    pub fn new(id: FeedId, folder_id: Option<FolderId>, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            id,
            folder_id,
            title: url.clone(),
            url,
            favicon_link: None,
            link: None,
            unread_count: 0,
        }
    }

    /// Sets the display title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }
}

/// A single article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    /// Server-assigned id.
    pub id: ArticleId,
    /// Owning feed.
    pub feed_id: FeedId,
    /// Hash of the article GUID, needed by the star endpoints.
    pub guid_hash: String,
    /// Title.
    pub title: String,
    /// Author, if the feed provides one.
    pub author: Option<String>,
    /// Link to the original article.
    pub url: Option<String>,
    /// HTML body.
    pub body: String,
    /// Publication time (unix seconds).
    pub published_at: i64,
    /// Last modification time reported by the server (unix seconds).
    pub last_modified: i64,
    /// Read flag.
    pub read: bool,
    /// Starred flag.
    pub starred: bool,
    /// Sync marker this record was last merged from.
    pub sync_marker: u64,
}

impl Article {
    /// Returns true if the content fields differ from `other`.
    #[must_use]
    pub fn content_differs(&self, other: &Article) -> bool {
        self.title != other.title
            || self.body != other.body
            || self.author != other.author
            || self.url != other.url
            || self.published_at != other.published_at
            || self.last_modified != other.last_modified
            || self.guid_hash != other.guid_hash
            || self.feed_id != other.feed_id
    }
}
