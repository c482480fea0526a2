//! In-memory tables and the row-level change log applied to them.

use crate::merge::PullCursor;
use crate::model::{
    AccountId, Article, ArticleId, Feed, FeedId, Folder, FolderId, MutationFailure,
    MutationHandle, PendingMutation, RemapTable,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Store-wide counters and the pull watermark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMeta {
    /// Account the store belongs to.
    pub account: AccountId,
    /// Next mutation handle.
    pub next_handle: u64,
    /// Magnitude of the next placeholder id (placeholders are `-next_placeholder`).
    pub next_placeholder: i64,
    /// Highest article sync marker merged so far.
    pub watermark: u64,
    /// Progress of an item fetch the item cap cut short.
    #[serde(default)]
    pub pull_cursor: Option<PullCursor>,
}

impl StoreMeta {
    pub(crate) fn new(account: AccountId) -> Self {
        Self {
            account,
            next_handle: 1,
            next_placeholder: 1,
            watermark: 0,
            pull_cursor: None,
        }
    }
}

/// The complete persisted state of one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tables {
    pub(crate) folders: BTreeMap<FolderId, Folder>,
    pub(crate) feeds: BTreeMap<FeedId, Feed>,
    pub(crate) articles: BTreeMap<ArticleId, Article>,
    pub(crate) mutations: BTreeMap<MutationHandle, PendingMutation>,
    pub(crate) remap: RemapTable,
    pub(crate) failures: Vec<MutationFailure>,
    pub(crate) meta: StoreMeta,
}

/// One row-level change. A committed transaction is an ordered list of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum Change {
    PutFolder(Folder),
    RemoveFolder(FolderId),
    PutFeed(Feed),
    RemoveFeed(FeedId),
    PutArticle(Article),
    RemoveArticle(ArticleId),
    PutMutation(PendingMutation),
    RemoveMutation(MutationHandle),
    PutRemap { placeholder: i64, confirmed: i64 },
    RemoveRemap(i64),
    RecordFailure(MutationFailure),
    ClearFailures,
    SetMeta(StoreMeta),
}

impl Tables {
    pub(crate) fn new(account: AccountId) -> Self {
        Self {
            folders: BTreeMap::new(),
            feeds: BTreeMap::new(),
            articles: BTreeMap::new(),
            mutations: BTreeMap::new(),
            remap: RemapTable::new(),
            failures: Vec::new(),
            meta: StoreMeta::new(account),
        }
    }

    /// Applies one change. Changes are total: removing a missing row is a no-op.
    pub(crate) fn apply(&mut self, change: &Change) {
        match change {
            Change::PutFolder(folder) => {
                self.folders.insert(folder.id, folder.clone());
            }
            Change::RemoveFolder(id) => {
                self.folders.remove(id);
            }
            Change::PutFeed(feed) => {
                self.feeds.insert(feed.id, feed.clone());
            }
            Change::RemoveFeed(id) => {
                self.feeds.remove(id);
            }
            Change::PutArticle(article) => {
                self.articles.insert(article.id, article.clone());
            }
            Change::RemoveArticle(id) => {
                self.articles.remove(id);
            }
            Change::PutMutation(mutation) => {
                self.mutations.insert(mutation.handle, mutation.clone());
            }
            Change::RemoveMutation(handle) => {
                self.mutations.remove(handle);
            }
            Change::PutRemap {
                placeholder,
                confirmed,
            } => {
                self.remap.insert(*placeholder, *confirmed);
            }
            Change::RemoveRemap(placeholder) => {
                self.remap.remove(placeholder);
            }
            Change::RecordFailure(failure) => self.failures.push(failure.clone()),
            Change::ClearFailures => self.failures.clear(),
            Change::SetMeta(meta) => self.meta = meta.clone(),
        }
    }

    /// Number of unread articles in `feed`.
    pub(crate) fn unread_in(&self, feed: FeedId) -> u32 {
        self.articles
            .values()
            .filter(|a| a.feed_id == feed && !a.read)
            .count() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables() -> Tables {
        Tables::new(AccountId::from_raw("test"))
    }

    #[test]
    fn apply_put_and_remove() {
        let mut t = tables();
        let folder = Folder::new(FolderId::new(1), "News");

        t.apply(&Change::PutFolder(folder.clone()));
        assert_eq!(t.folders.get(&folder.id), Some(&folder));

        t.apply(&Change::RemoveFolder(folder.id));
        assert!(t.folders.is_empty());

        // Removing again is a no-op.
        t.apply(&Change::RemoveFolder(folder.id));
    }

    #[test]
    fn remap_changes() {
        let mut t = tables();
        t.apply(&Change::PutRemap {
            placeholder: -1,
            confirmed: 9,
        });
        assert_eq!(t.remap.get(&-1), Some(&9));
        t.apply(&Change::RemoveRemap(-1));
        assert!(t.remap.is_empty());
    }
}
