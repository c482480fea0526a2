//! Write transactions.
//!
//! A [`WriteTxn`] edits the store's tables in place. Every mutation is
//! applied immediately, logged as a [`Change`] for the journal, and paired
//! with an undo entry holding the row it replaced. Dropping a transaction
//! without [`WriteTxn::commit`] replays the undo log, so a failed closure or
//! a failed journal append leaves the tables exactly as they were.

use crate::merge::PullCursor;
use crate::model::{
    Article, ArticleId, Feed, FeedId, Folder, FolderId, MutationFailure, MutationHandle,
    PendingMutation,
};
use crate::tables::{Change, StoreMeta, Tables};

/// Prior state of whatever one [`Change`] touched.
enum Undo {
    Folder(FolderId, Option<Folder>),
    Feed(FeedId, Option<Feed>),
    Article(ArticleId, Option<Article>),
    Mutation(MutationHandle, Option<PendingMutation>),
    Remap(i64, Option<i64>),
    FailuresLen(usize),
    Failures(Vec<MutationFailure>),
    Meta(StoreMeta),
}

/// An open write transaction. Rolls back on drop unless committed.
pub(crate) struct WriteTxn<'a> {
    tables: &'a mut Tables,
    changes: Vec<Change>,
    undo: Vec<Undo>,
}

impl<'a> WriteTxn<'a> {
    pub(crate) fn new(tables: &'a mut Tables) -> Self {
        Self {
            tables,
            changes: Vec::new(),
            undo: Vec::new(),
        }
    }

    /// Returns the tables as modified so far.
    pub(crate) fn tables(&self) -> &Tables {
        self.tables
    }

    /// Changes recorded so far, in order.
    pub(crate) fn changes(&self) -> &[Change] {
        &self.changes
    }

    /// Keeps every change and returns the change list.
    pub(crate) fn commit(mut self) -> Vec<Change> {
        self.undo.clear();
        std::mem::take(&mut self.changes)
    }

    fn record(&mut self, change: Change) {
        let undo = self.undo_entry(&change);
        self.tables.apply(&change);
        self.undo.push(undo);
        self.changes.push(change);
    }

    fn undo_entry(&self, change: &Change) -> Undo {
        let t = &*self.tables;
        match change {
            Change::PutFolder(Folder { id, .. }) | Change::RemoveFolder(id) => {
                Undo::Folder(*id, t.folders.get(id).cloned())
            }
            Change::PutFeed(Feed { id, .. }) | Change::RemoveFeed(id) => {
                Undo::Feed(*id, t.feeds.get(id).cloned())
            }
            Change::PutArticle(Article { id, .. }) | Change::RemoveArticle(id) => {
                Undo::Article(*id, t.articles.get(id).cloned())
            }
            Change::PutMutation(PendingMutation { handle, .. })
            | Change::RemoveMutation(handle) => {
                Undo::Mutation(*handle, t.mutations.get(handle).cloned())
            }
            Change::PutRemap { placeholder, .. } | Change::RemoveRemap(placeholder) => {
                Undo::Remap(*placeholder, t.remap.get(placeholder).copied())
            }
            Change::RecordFailure(_) => Undo::FailuresLen(t.failures.len()),
            Change::ClearFailures => Undo::Failures(t.failures.clone()),
            Change::SetMeta(_) => Undo::Meta(t.meta.clone()),
        }
    }

    fn restore(&mut self, undo: Undo) {
        let t = &mut *self.tables;
        match undo {
            Undo::Folder(id, row) => restore_row(&mut t.folders, id, row),
            Undo::Feed(id, row) => restore_row(&mut t.feeds, id, row),
            Undo::Article(id, row) => restore_row(&mut t.articles, id, row),
            Undo::Mutation(handle, row) => restore_row(&mut t.mutations, handle, row),
            Undo::Remap(placeholder, row) => restore_row(&mut t.remap, placeholder, row),
            Undo::FailuresLen(len) => t.failures.truncate(len),
            Undo::Failures(failures) => t.failures = failures,
            Undo::Meta(meta) => t.meta = meta,
        }
    }

    /// Inserts or replaces a folder. Returns false if the stored row was already identical.
    pub(crate) fn put_folder(&mut self, folder: Folder) -> bool {
        if self.tables.folders.get(&folder.id) == Some(&folder) {
            return false;
        }
        self.record(Change::PutFolder(folder));
        true
    }

    pub(crate) fn remove_folder(&mut self, id: FolderId) -> Option<Folder> {
        let existing = self.tables.folders.get(&id).cloned()?;
        self.record(Change::RemoveFolder(id));
        Some(existing)
    }

    /// Inserts or replaces a feed. Returns false if the stored row was already identical.
    pub(crate) fn put_feed(&mut self, feed: Feed) -> bool {
        if self.tables.feeds.get(&feed.id) == Some(&feed) {
            return false;
        }
        self.record(Change::PutFeed(feed));
        true
    }

    /// Removes a feed together with its articles.
    pub(crate) fn remove_feed(&mut self, id: FeedId) -> Option<Feed> {
        let existing = self.tables.feeds.get(&id).cloned()?;
        let articles: Vec<ArticleId> = self
            .tables
            .articles
            .values()
            .filter(|a| a.feed_id == id)
            .map(|a| a.id)
            .collect();
        for article in articles {
            self.record(Change::RemoveArticle(article));
        }
        self.record(Change::RemoveFeed(id));
        Some(existing)
    }

    /// Inserts or replaces an article. Returns false if the stored row was already identical.
    pub(crate) fn put_article(&mut self, article: Article) -> bool {
        if self.tables.articles.get(&article.id) == Some(&article) {
            return false;
        }
        self.record(Change::PutArticle(article));
        true
    }

    pub(crate) fn put_mutation(&mut self, mutation: PendingMutation) {
        self.record(Change::PutMutation(mutation));
    }

    pub(crate) fn remove_mutation(&mut self, handle: MutationHandle) -> Option<PendingMutation> {
        let existing = self.tables.mutations.get(&handle).cloned()?;
        self.record(Change::RemoveMutation(handle));
        Some(existing)
    }

    pub(crate) fn put_remap(&mut self, placeholder: i64, confirmed: i64) {
        if self.tables.remap.get(&placeholder) == Some(&confirmed) {
            return;
        }
        self.record(Change::PutRemap {
            placeholder,
            confirmed,
        });
    }

    pub(crate) fn remove_remap(&mut self, placeholder: i64) {
        if self.tables.remap.contains_key(&placeholder) {
            self.record(Change::RemoveRemap(placeholder));
        }
    }

    pub(crate) fn record_failure(&mut self, failure: MutationFailure) {
        self.record(Change::RecordFailure(failure));
    }

    pub(crate) fn clear_failures(&mut self) {
        if !self.tables.failures.is_empty() {
            self.record(Change::ClearFailures);
        }
    }

    fn set_meta(&mut self, meta: StoreMeta) {
        if self.tables.meta != meta {
            self.record(Change::SetMeta(meta));
        }
    }

    /// Allocates the next mutation handle.
    pub(crate) fn allocate_handle(&mut self) -> MutationHandle {
        let mut meta = self.tables.meta.clone();
        let handle = MutationHandle::new(meta.next_handle);
        meta.next_handle += 1;
        self.set_meta(meta);
        handle
    }

    /// Allocates the next placeholder id (always negative).
    pub(crate) fn allocate_placeholder(&mut self) -> i64 {
        let mut meta = self.tables.meta.clone();
        let placeholder = -meta.next_placeholder;
        meta.next_placeholder += 1;
        self.set_meta(meta);
        placeholder
    }

    /// Raises the watermark to `marker` if it is higher.
    pub(crate) fn advance_watermark(&mut self, marker: u64) -> u64 {
        let mut meta = self.tables.meta.clone();
        meta.watermark = meta.watermark.max(marker);
        let watermark = meta.watermark;
        self.set_meta(meta);
        watermark
    }

    /// Opens, moves, or closes the partial item fetch cursor.
    pub(crate) fn set_pull_cursor(&mut self, cursor: Option<PullCursor>) {
        let mut meta = self.tables.meta.clone();
        meta.pull_cursor = cursor;
        self.set_meta(meta);
    }

    /// Recomputes the cached unread count of `feed`.
    pub(crate) fn refresh_unread(&mut self, feed: FeedId) {
        let unread = self.tables.unread_in(feed);
        if let Some(existing) = self.tables.feeds.get(&feed) {
            if existing.unread_count != unread {
                let mut updated = existing.clone();
                updated.unread_count = unread;
                self.record(Change::PutFeed(updated));
            }
        }
    }

    /// Recomputes the cached unread count of every feed.
    pub(crate) fn refresh_all_unread(&mut self) {
        let feeds: Vec<FeedId> = self.tables.feeds.keys().copied().collect();
        for feed in feeds {
            self.refresh_unread(feed);
        }
    }
}

impl Drop for WriteTxn<'_> {
    fn drop(&mut self) {
        while let Some(undo) = self.undo.pop() {
            self.restore(undo);
        }
    }
}

fn restore_row<K: Ord, V>(map: &mut std::collections::BTreeMap<K, V>, key: K, row: Option<V>) {
    match row {
        Some(row) => {
            map.insert(key, row);
        }
        None => {
            map.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AccountId, MutationKind};

    fn tables() -> Tables {
        Tables::new(AccountId::from_raw("txn-test"))
    }

    fn article(id: i64, feed: i64) -> Article {
        Article {
            id: ArticleId::new(id),
            feed_id: FeedId::new(feed),
            guid_hash: "h".into(),
            title: "t".into(),
            author: None,
            url: None,
            body: String::new(),
            published_at: 0,
            last_modified: 0,
            read: false,
            starred: false,
            sync_marker: 1,
        }
    }

    #[test]
    fn identical_put_records_nothing() {
        let mut tables = tables();
        let mut txn = WriteTxn::new(&mut tables);
        let folder = Folder::new(FolderId::new(1), "News");
        assert!(txn.put_folder(folder.clone()));
        assert!(!txn.put_folder(folder));
        assert_eq!(txn.commit().len(), 1);
    }

    #[test]
    fn placeholders_are_negative_and_unique() {
        let mut tables = tables();
        let mut txn = WriteTxn::new(&mut tables);
        let a = txn.allocate_placeholder();
        let b = txn.allocate_placeholder();
        assert_eq!(a, -1);
        assert_eq!(b, -2);
    }

    #[test]
    fn watermark_never_moves_backwards() {
        let mut tables = tables();
        let mut txn = WriteTxn::new(&mut tables);
        assert_eq!(txn.advance_watermark(50), 50);
        assert_eq!(txn.advance_watermark(20), 50);
    }

    #[test]
    fn removing_feed_drops_its_articles() {
        let mut tables = tables();
        let mut txn = WriteTxn::new(&mut tables);
        let feed = Feed::new(FeedId::new(3), None, "https://example.com/rss");
        txn.put_feed(feed);
        txn.put_article(article(10, 3));
        txn.refresh_unread(FeedId::new(3));
        assert_eq!(txn.tables().feeds[&FeedId::new(3)].unread_count, 1);

        txn.remove_feed(FeedId::new(3));
        assert!(txn.tables().articles.is_empty());
        assert!(txn.tables().feeds.is_empty());
    }

    #[test]
    fn commit_keeps_changes() {
        let mut tables = tables();
        let mut txn = WriteTxn::new(&mut tables);
        txn.put_folder(Folder::new(FolderId::new(1), "News"));
        txn.commit();
        assert_eq!(tables.folders.len(), 1);
    }

    #[test]
    fn dropping_uncommitted_txn_restores_every_table() {
        let mut tables = tables();
        {
            let mut seed = WriteTxn::new(&mut tables);
            seed.put_folder(Folder::new(FolderId::new(1), "News"));
            seed.put_feed(Feed::new(FeedId::new(3), Some(FolderId::new(1)), "u"));
            seed.put_article(article(10, 3));
            seed.put_remap(-1, 7);
            seed.record_failure(MutationFailure {
                handle: MutationHandle::new(1),
                kind: MutationKind::DeleteFeed,
                reason: "gone".into(),
                failed_at: 0,
            });
            seed.commit();
        }
        let before = tables.clone();

        {
            let mut txn = WriteTxn::new(&mut tables);
            txn.put_folder(Folder::new(FolderId::new(1), "Renamed"));
            txn.put_folder(Folder::new(FolderId::new(2), "Extra"));
            txn.remove_feed(FeedId::new(3));
            txn.remove_remap(-1);
            txn.clear_failures();
            txn.allocate_handle();
            txn.advance_watermark(99);
            assert!(txn.tables().articles.is_empty());
        }

        assert_eq!(tables, before);
    }
}
