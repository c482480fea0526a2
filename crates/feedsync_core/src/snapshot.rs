//! Consistent read views of the store.

use crate::merge::PullCursor;
use crate::model::{
    AccountId, Article, ArticleId, Feed, FeedId, Folder, FolderId, MutationFailure,
    PendingMutation, RemapTable,
};
use crate::tables::Tables;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// An immutable view of the store at one commit.
///
/// Snapshots are cheap to take and never observe a partially applied
/// transaction; writes committed after the snapshot was taken are not visible.
#[derive(Debug, Clone)]
pub struct Snapshot {
    tables: Arc<Tables>,
}

impl Snapshot {
    pub(crate) fn new(tables: Arc<Tables>) -> Self {
        Self { tables }
    }

    #[cfg(test)]
    pub(crate) fn tables(&self) -> &Tables {
        &self.tables
    }

    /// Returns the account the store belongs to.
    #[must_use]
    pub fn account(&self) -> &AccountId {
        &self.tables.meta.account
    }

    /// Returns all folders ordered by id.
    pub fn folders(&self) -> impl Iterator<Item = &Folder> {
        self.tables.folders.values()
    }

    /// Looks up one folder.
    #[must_use]
    pub fn folder(&self, id: FolderId) -> Option<&Folder> {
        self.tables.folders.get(&id)
    }

    /// Returns all feeds ordered by id.
    pub fn feeds(&self) -> impl Iterator<Item = &Feed> {
        self.tables.feeds.values()
    }

    /// Looks up one feed.
    #[must_use]
    pub fn feed(&self, id: FeedId) -> Option<&Feed> {
        self.tables.feeds.get(&id)
    }

    /// Returns the feeds directly inside `folder` (`None` for feeds without a folder).
    pub fn feeds_in(&self, folder: Option<FolderId>) -> impl Iterator<Item = &Feed> {
        self.tables
            .feeds
            .values()
            .filter(move |feed| feed.folder_id == folder)
    }

    /// Returns all articles ordered by id.
    pub fn articles(&self) -> impl Iterator<Item = &Article> {
        self.tables.articles.values()
    }

    /// Looks up one article.
    #[must_use]
    pub fn article(&self, id: ArticleId) -> Option<&Article> {
        self.tables.articles.get(&id)
    }

    /// Returns the articles of `feed`.
    pub fn articles_in(&self, feed: FeedId) -> impl Iterator<Item = &Article> {
        self.tables
            .articles
            .values()
            .filter(move |article| article.feed_id == feed)
    }

    /// Returns queued mutations in creation order.
    pub fn pending_mutations(&self) -> impl Iterator<Item = &PendingMutation> {
        self.tables.mutations.values()
    }

    /// Returns the failure records not yet cleared.
    #[must_use]
    pub fn failures(&self) -> &[MutationFailure] {
        &self.tables.failures
    }

    /// Returns the placeholder remap table.
    #[must_use]
    pub fn remap(&self) -> &RemapTable {
        &self.tables.remap
    }

    /// Returns the highest article sync marker merged so far.
    #[must_use]
    pub fn watermark(&self) -> u64 {
        self.tables.meta.watermark
    }

    /// Returns the open partial item fetch, if the item cap cut the last one short.
    #[must_use]
    pub fn pull_cursor(&self) -> Option<PullCursor> {
        self.tables.meta.pull_cursor
    }

    /// Returns row counts for this snapshot.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        let tables = &self.tables;
        StoreStats {
            folders: tables.folders.len(),
            feeds: tables.feeds.len(),
            articles: tables.articles.len(),
            unread: tables.articles.values().filter(|a| !a.read).count(),
            starred: tables.articles.values().filter(|a| a.starred).count(),
            pending_mutations: tables.mutations.len(),
            failures: tables.failures.len(),
            placeholders: tables
                .folders
                .keys()
                .filter(|id| id.is_placeholder())
                .count()
                + tables.feeds.keys().filter(|id| id.is_placeholder()).count(),
            watermark: tables.meta.watermark,
            journal_bytes: 0,
        }
    }
}

/// Row counts of a store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Number of folders.
    pub folders: usize,
    /// Number of feeds.
    pub feeds: usize,
    /// Number of articles.
    pub articles: usize,
    /// Number of unread articles.
    pub unread: usize,
    /// Number of starred articles.
    pub starred: usize,
    /// Number of queued mutations.
    pub pending_mutations: usize,
    /// Number of uncleared failure records.
    pub failures: usize,
    /// Number of folders and feeds still under a placeholder id.
    pub placeholders: usize,
    /// Current watermark.
    pub watermark: u64,
    /// Size of the journal on its backend. Zero when taken from a [`Snapshot`].
    pub journal_bytes: u64,
}
