//! The persisted store.

use crate::config::StoreConfig;
use crate::dir::StoreDir;
use crate::error::{StoreError, StoreResult};
use crate::journal::Journal;
use crate::merge::{self, MergeReport, ServerSnapshot};
use crate::model::{
    AccountId, ArticleId, FailureDisposition, Feed, FeedId, Folder, FolderId, MutationFailure,
    MutationHandle, MutationOp, ReadyMutation,
};
use crate::queue;
use crate::snapshot::{Snapshot, StoreStats};
use crate::storage::{FileBackend, MemoryBackend, StorageBackend};
use crate::tables::Tables;
use crate::txn::WriteTxn;
use parking_lot::{Mutex, RwLock};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Durable local state of one account: folders, feeds, articles, and the
/// pending mutation queue.
///
/// All writes go through a single writer lock and land as one journal
/// record per transaction, so a write either happens completely or not at
/// all. Readers take a [`Snapshot`], which stays unchanged while later
/// writes proceed; taking one waits only for a write already in progress.
///
/// # Example
///
/// ```rust
/// use feedsync_core::{AccountId, Store};
///
/// let account = AccountId::derive("https://cloud.example.com", "alice");
/// let store = Store::open_in_memory(account)?;
///
/// let (folder, _handle) = store.create_folder("Tech")?;
/// assert!(folder.is_placeholder());
/// assert_eq!(store.snapshot().pending_mutations().count(), 1);
/// # Ok::<(), feedsync_core::StoreError>(())
/// ```
pub struct Store {
    account: AccountId,
    config: StoreConfig,
    /// Store directory (holds the lock). None for in-memory stores.
    _dir: Option<StoreDir>,
    journal: Mutex<Journal>,
    current: RwLock<Arc<Tables>>,
}

impl Store {
    /// Opens the store for `account` under the data root `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Another process has the store locked (`Locked`)
    /// - The journal belongs to a different account (`AccountMismatch`)
    /// - The journal cannot be decoded or I/O fails
    pub fn open(root: &Path, account: AccountId, config: StoreConfig) -> StoreResult<Self> {
        let dir = StoreDir::open(root, &account, config.create_if_missing)?;
        let backend = FileBackend::open(&dir.journal_path())?;
        info!(path = %dir.path().display(), account = %account, "opening store");
        Self::build(account, config, Box::new(backend), Some(dir))
    }

    /// Opens a volatile store. Contents are lost when the store is dropped.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the signature matches [`Store::open`].
    pub fn open_in_memory(account: AccountId) -> StoreResult<Self> {
        Self::open_with_backend(account, StoreConfig::default(), Box::new(MemoryBackend::new()))
    }

    /// Opens a store over an arbitrary journal backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal cannot be replayed or belongs to another account.
    pub fn open_with_backend(
        account: AccountId,
        config: StoreConfig,
        backend: Box<dyn StorageBackend>,
    ) -> StoreResult<Self> {
        Self::build(account, config, backend, None)
    }

    fn build(
        account: AccountId,
        config: StoreConfig,
        backend: Box<dyn StorageBackend>,
        dir: Option<StoreDir>,
    ) -> StoreResult<Self> {
        let (journal, tables) =
            Journal::open(backend, config.sync_on_commit, Tables::new(account.clone()))?;

        if tables.meta.account != account {
            return Err(StoreError::AccountMismatch {
                expected: tables.meta.account.to_string(),
                actual: account.to_string(),
            });
        }

        debug!(
            seq = journal.seq(),
            folders = tables.folders.len(),
            feeds = tables.feeds.len(),
            articles = tables.articles.len(),
            pending = tables.mutations.len(),
            watermark = tables.meta.watermark,
            "store recovered"
        );

        Ok(Self {
            account,
            config,
            _dir: dir,
            journal: Mutex::new(journal),
            current: RwLock::new(Arc::new(tables)),
        })
    }

    /// Returns the account this store belongs to.
    #[must_use]
    pub fn account(&self) -> &AccountId {
        &self.account
    }

    /// Returns a consistent view of the latest committed state.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(Arc::clone(&self.current.read()))
    }

    /// Returns row counts of the latest committed state and the journal size.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        let journal = self.journal.lock();
        let mut stats = self.snapshot().stats();
        stats.journal_bytes = journal.size().unwrap_or(0);
        stats
    }

    /// Runs `f` as one atomic write transaction.
    ///
    /// The closure edits the live tables in place; the tables are copied
    /// first only if a [`Snapshot`] still shares them. If the closure or the
    /// journal append fails, the transaction's undo log restores the tables
    /// before the error is returned.
    fn write<T>(&self, f: impl FnOnce(&mut WriteTxn<'_>) -> StoreResult<T>) -> StoreResult<T> {
        let mut journal = self.journal.lock();
        let mut current = self.current.write();

        let mut txn = WriteTxn::new(Arc::make_mut(&mut current));
        let result = f(&mut txn)?;
        if txn.changes().is_empty() {
            return Ok(result);
        }

        let seq = journal.append_commit(txn.changes())?;
        let changes = txn.commit();
        debug!(seq, changes = changes.len(), "transaction committed");

        let oversized = journal
            .size()
            .is_ok_and(|size| size > self.config.compaction_threshold);
        if oversized && journal.records_since_snapshot() >= self.config.compaction_min_records {
            // The commit above is durable; a failed compaction only leaves a longer journal.
            if let Err(err) = journal.compact(&current) {
                warn!(error = %err, "journal compaction failed");
            }
        }
        Ok(result)
    }

    /// Rewrites the journal as a single snapshot record.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written.
    pub fn compact(&self) -> StoreResult<()> {
        let mut journal = self.journal.lock();
        let tables = Arc::clone(&self.current.read());
        journal.compact(&tables)
    }

    // ------------------------------------------------------------------
    // Server merge
    // ------------------------------------------------------------------

    /// Merges server-confirmed state in one atomic transaction and advances
    /// the watermark to the highest marker observed.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction cannot be journaled; the store is
    /// then unchanged.
    pub fn upsert_from_server(&self, snapshot: ServerSnapshot) -> StoreResult<MergeReport> {
        self.write(|txn| Ok(merge::merge(txn, snapshot)))
    }

    /// Returns the pull watermark of `account`.
    ///
    /// # Errors
    ///
    /// Returns `AccountMismatch` if `account` is not the account this store belongs to.
    pub fn watermark(&self, account: &AccountId) -> StoreResult<u64> {
        if account != &self.account {
            return Err(StoreError::AccountMismatch {
                expected: self.account.to_string(),
                actual: account.to_string(),
            });
        }
        Ok(self.current.read().meta.watermark)
    }

    // ------------------------------------------------------------------
    // Mutation queue
    // ------------------------------------------------------------------

    /// Appends a raw mutation to the queue without touching local rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction cannot be journaled.
    pub fn enqueue_mutation(&self, op: MutationOp) -> StoreResult<MutationHandle> {
        self.write(|txn| Ok(queue::enqueue(txn, op)))
    }

    /// Returns up to `limit` of the oldest mutations whose prerequisites are
    /// confirmed, with placeholder references already resolved.
    #[must_use]
    pub fn next_mutations(&self, limit: usize) -> Vec<ReadyMutation> {
        queue::next_mutations(&self.current.read(), limit)
    }

    /// Removes a pushed mutation that created nothing.
    ///
    /// # Errors
    ///
    /// Returns `UnknownMutation` for an unknown handle and `Invalid` for a create.
    pub fn confirm_mutation(&self, handle: MutationHandle) -> StoreResult<()> {
        self.write(|txn| queue::confirm(txn, handle))
    }

    /// Confirms a create and moves its entity from the placeholder to `confirmed`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownMutation` for an unknown handle and `Invalid` if the
    /// mutation is not a create or `confirmed` is not a server id.
    pub fn confirm_created(&self, handle: MutationHandle, confirmed: i64) -> StoreResult<()> {
        self.write(|txn| queue::confirm_created(txn, handle, confirmed))
    }

    /// Records a failed push.
    ///
    /// # Errors
    ///
    /// Returns `UnknownMutation` for an unknown handle.
    pub fn fail_mutation(
        &self,
        handle: MutationHandle,
        disposition: FailureDisposition,
        reason: &str,
    ) -> StoreResult<()> {
        self.write(|txn| queue::fail(txn, handle, disposition, reason))
    }

    /// Returns and clears the failure records.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction cannot be journaled.
    pub fn take_failures(&self) -> StoreResult<Vec<MutationFailure>> {
        self.write(|txn| {
            let failures = txn.tables().failures.clone();
            txn.clear_failures();
            Ok(failures)
        })
    }

    // ------------------------------------------------------------------
    // Local user actions
    // ------------------------------------------------------------------

    /// Sets the read flag of an article and queues the change.
    ///
    /// Returns `None` if the article already has that state.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the article does not exist.
    pub fn mark_article_read(
        &self,
        article: ArticleId,
        read: bool,
    ) -> StoreResult<Option<MutationHandle>> {
        self.write(|txn| {
            let mut row = txn
                .tables()
                .articles
                .get(&article)
                .cloned()
                .ok_or_else(|| StoreError::not_found("article", article.get()))?;
            if row.read == read {
                return Ok(None);
            }
            row.read = read;
            let feed = row.feed_id;
            txn.put_article(row);
            txn.refresh_unread(feed);
            Ok(Some(queue::enqueue(txn, MutationOp::MarkRead { article, read })))
        })
    }

    /// Sets the starred flag of an article and queues the change.
    ///
    /// Returns `None` if the article already has that state.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the article does not exist.
    pub fn star_article(
        &self,
        article: ArticleId,
        starred: bool,
    ) -> StoreResult<Option<MutationHandle>> {
        self.write(|txn| {
            let mut row = txn
                .tables()
                .articles
                .get(&article)
                .cloned()
                .ok_or_else(|| StoreError::not_found("article", article.get()))?;
            if row.starred == starred {
                return Ok(None);
            }
            row.starred = starred;
            let op = MutationOp::Star {
                article,
                feed: row.feed_id,
                guid_hash: row.guid_hash.clone(),
                starred,
            };
            txn.put_article(row);
            Ok(Some(queue::enqueue(txn, op)))
        })
    }

    /// Marks every article of `feed` read and queues the change.
    ///
    /// Returns `None` if the feed has no unread articles.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the feed does not exist.
    pub fn mark_feed_read(&self, feed: FeedId) -> StoreResult<Option<MutationHandle>> {
        self.write(|txn| {
            require_feed(txn, feed)?;
            let articles: Vec<_> = txn
                .tables()
                .articles
                .values()
                .filter(|a| a.feed_id == feed)
                .cloned()
                .collect();
            if articles.iter().all(|a| a.read) {
                return Ok(None);
            }
            let newest = articles
                .iter()
                .map(|a| a.id)
                .max()
                .unwrap_or(ArticleId::new(0));
            for mut article in articles {
                article.read = true;
                txn.put_article(article);
            }
            txn.refresh_unread(feed);
            Ok(Some(queue::enqueue(
                txn,
                MutationOp::MarkFeedRead { feed, newest },
            )))
        })
    }

    /// Creates a folder under a placeholder id and queues its creation.
    ///
    /// # Errors
    ///
    /// Returns `Invalid` if the name is blank or already used by another folder.
    pub fn create_folder(&self, name: &str) -> StoreResult<(FolderId, MutationHandle)> {
        let name = folder_name(name)?;
        self.write(|txn| {
            if txn.tables().folders.values().any(|f| f.name == name) {
                return Err(StoreError::invalid(format!("folder {name:?} already exists")));
            }
            let placeholder = FolderId::new(txn.allocate_placeholder());
            txn.put_folder(Folder::new(placeholder, name.clone()));
            let handle = queue::enqueue(txn, MutationOp::CreateFolder { placeholder, name });
            Ok((placeholder, handle))
        })
    }

    /// Renames a folder and queues the change.
    ///
    /// Returns `None` if the name is unchanged.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown folder and `Invalid` for a blank name.
    pub fn rename_folder(
        &self,
        folder: FolderId,
        name: &str,
    ) -> StoreResult<Option<MutationHandle>> {
        let name = folder_name(name)?;
        self.write(|txn| {
            let mut row = txn
                .tables()
                .folders
                .get(&folder)
                .cloned()
                .ok_or_else(|| StoreError::not_found("folder", folder.get()))?;
            if row.name == name {
                return Ok(None);
            }
            row.name.clone_from(&name);
            txn.put_folder(row);
            Ok(Some(queue::enqueue(
                txn,
                MutationOp::RenameFolder { folder, name },
            )))
        })
    }

    /// Deletes a folder with its feeds and articles, and queues the deletion.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown folder.
    pub fn delete_folder(&self, folder: FolderId) -> StoreResult<MutationHandle> {
        self.write(|txn| {
            if txn.remove_folder(folder).is_none() {
                return Err(StoreError::not_found("folder", folder.get()));
            }
            let feeds: Vec<FeedId> = txn
                .tables()
                .feeds
                .values()
                .filter(|feed| feed.folder_id == Some(folder))
                .map(|feed| feed.id)
                .collect();
            for feed in feeds {
                txn.remove_feed(feed);
            }
            Ok(queue::enqueue(txn, MutationOp::DeleteFolder { folder }))
        })
    }

    /// Subscribes to a feed under a placeholder id and queues the subscription.
    ///
    /// # Errors
    ///
    /// Returns `Invalid` for a blank or already subscribed URL and `NotFound`
    /// for an unknown folder.
    pub fn create_feed(
        &self,
        url: &str,
        folder: Option<FolderId>,
    ) -> StoreResult<(FeedId, MutationHandle)> {
        let url = url.trim().to_string();
        if url.is_empty() {
            return Err(StoreError::invalid("feed url must not be empty"));
        }
        self.write(|txn| {
            if let Some(folder) = folder {
                require_folder(txn, folder)?;
            }
            if txn.tables().feeds.values().any(|f| f.url == url) {
                return Err(StoreError::invalid(format!("already subscribed to {url}")));
            }
            let placeholder = FeedId::new(txn.allocate_placeholder());
            txn.put_feed(Feed::new(placeholder, folder, url.clone()));
            let handle = queue::enqueue(
                txn,
                MutationOp::CreateFeed {
                    placeholder,
                    url,
                    folder,
                },
            );
            Ok((placeholder, handle))
        })
    }

    /// Moves a feed to `folder` (or out of any folder) and queues the move.
    ///
    /// Returns `None` if the feed is already there.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown feed or folder.
    pub fn move_feed(
        &self,
        feed: FeedId,
        folder: Option<FolderId>,
    ) -> StoreResult<Option<MutationHandle>> {
        self.write(|txn| {
            let mut row = require_feed(txn, feed)?;
            if let Some(folder) = folder {
                require_folder(txn, folder)?;
            }
            if row.folder_id == folder {
                return Ok(None);
            }
            row.folder_id = folder;
            txn.put_feed(row);
            Ok(Some(queue::enqueue(txn, MutationOp::MoveFeed { feed, folder })))
        })
    }

    /// Renames a feed and queues the change.
    ///
    /// Returns `None` if the title is unchanged.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown feed and `Invalid` for a blank title.
    pub fn rename_feed(&self, feed: FeedId, title: &str) -> StoreResult<Option<MutationHandle>> {
        let title = title.trim().to_string();
        if title.is_empty() {
            return Err(StoreError::invalid("feed title must not be empty"));
        }
        self.write(|txn| {
            let mut row = require_feed(txn, feed)?;
            if row.title == title {
                return Ok(None);
            }
            row.title.clone_from(&title);
            txn.put_feed(row);
            Ok(Some(queue::enqueue(
                txn,
                MutationOp::RenameFeed { feed, title },
            )))
        })
    }

    /// Unsubscribes from a feed, drops its articles, and queues the deletion.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown feed.
    pub fn delete_feed(&self, feed: FeedId) -> StoreResult<MutationHandle> {
        self.write(|txn| {
            if txn.remove_feed(feed).is_none() {
                return Err(StoreError::not_found("feed", feed.get()));
            }
            Ok(queue::enqueue(txn, MutationOp::DeleteFeed { feed }))
        })
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("account", &self.account)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn folder_name(name: &str) -> StoreResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StoreError::invalid("folder name must not be empty"));
    }
    Ok(name.to_string())
}

fn require_folder(txn: &WriteTxn, folder: FolderId) -> StoreResult<()> {
    if txn.tables().folders.contains_key(&folder) {
        Ok(())
    } else {
        Err(StoreError::not_found("folder", folder.get()))
    }
}

fn require_feed(txn: &WriteTxn, feed: FeedId) -> StoreResult<Feed> {
    txn.tables()
        .feeds
        .get(&feed)
        .cloned()
        .ok_or_else(|| StoreError::not_found("feed", feed.get()))
}
