//! Folding server state into the local tables.
//!
//! Articles follow a field-level rule: content fields always come from the
//! server, while the local read and starred flags survive unless the
//! incoming record carries a sync marker newer than the one the local row
//! was last merged from. Folders and feeds with a pending local rename,
//! move, or delete keep their local shape until that mutation is confirmed.

use crate::model::{Article, Feed, FeedId, Folder, FolderId, MutationOp};
use crate::txn::WriteTxn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Server state fetched in one pull.
///
/// A `Some` folder or feed list is authoritative: confirmed local rows
/// missing from it are treated as deleted on the server. `None` leaves the
/// corresponding table untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerSnapshot {
    /// Complete folder list, if fetched.
    pub folders: Option<Vec<Folder>>,
    /// Complete feed list, if fetched.
    pub feeds: Option<Vec<Feed>>,
    /// Articles changed since the last watermark.
    pub articles: Vec<Article>,
    /// Highest sync marker observed while fetching.
    pub marker: u64,
    /// Set when the item cap ended the fetch before the oldest changed item.
    pub resume_offset: Option<i64>,
}

impl ServerSnapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the authoritative folder list.
    #[must_use]
    pub fn with_folders(mut self, folders: Vec<Folder>) -> Self {
        self.folders = Some(folders);
        self
    }

    /// Sets the authoritative feed list.
    #[must_use]
    pub fn with_feeds(mut self, feeds: Vec<Feed>) -> Self {
        self.feeds = Some(feeds);
        self
    }

    /// Sets the changed articles and raises the marker to the highest among them.
    #[must_use]
    pub fn with_articles(mut self, articles: Vec<Article>) -> Self {
        let highest = articles.iter().map(|a| a.sync_marker).max().unwrap_or(0);
        self.marker = self.marker.max(highest);
        self.articles = articles;
        self
    }

    /// Sets the observed marker explicitly.
    #[must_use]
    pub fn with_marker(mut self, marker: u64) -> Self {
        self.marker = self.marker.max(marker);
        self
    }

    /// Marks the article list as partial; the next fetch continues below `offset`.
    #[must_use]
    pub fn with_resume_offset(mut self, offset: i64) -> Self {
        self.resume_offset = Some(offset);
        self
    }
}

/// An item fetch spread over several pulls because of the item cap.
///
/// While a cursor is open the watermark stays at `since`, so items older
/// than the cap are still selected by the next pull, which starts below
/// `offset`. When the last partial fetch completes the watermark moves to
/// `ceiling`, the highest marker seen by the first partial fetch. Items
/// fetched again after that are merged idempotently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullCursor {
    /// Watermark the partial fetches select against.
    pub since: u64,
    /// Lowest item id fetched so far.
    pub offset: i64,
    /// Watermark to adopt once the fetch completes.
    pub ceiling: u64,
}

/// Counts produced by one merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    /// Folders inserted or changed.
    pub folders_upserted: usize,
    /// Folders removed because the server no longer lists them.
    pub folders_removed: usize,
    /// Feeds inserted or changed.
    pub feeds_upserted: usize,
    /// Feeds removed because the server no longer lists them.
    pub feeds_removed: usize,
    /// Articles seen for the first time.
    pub articles_inserted: usize,
    /// Existing articles that changed.
    pub articles_updated: usize,
    /// Articles whose local read/starred state was kept over the server's.
    pub articles_kept_local: usize,
    /// Articles dropped because their feed is unknown locally.
    pub articles_skipped: usize,
    /// Watermark after the merge.
    pub watermark: u64,
}

impl MergeReport {
    /// Returns true if the merge changed nothing.
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        self.folders_upserted == 0
            && self.folders_removed == 0
            && self.feeds_upserted == 0
            && self.feeds_removed == 0
            && self.articles_inserted == 0
            && self.articles_updated == 0
    }
}

#[derive(Default)]
struct PendingOverlay {
    deleted_folders: BTreeSet<FolderId>,
    renamed_folders: BTreeSet<FolderId>,
    deleted_feeds: BTreeSet<FeedId>,
    renamed_feeds: BTreeSet<FeedId>,
    moved_feeds: BTreeSet<FeedId>,
}

impl PendingOverlay {
    fn collect(txn: &WriteTxn) -> Self {
        let tables = txn.tables();
        let mut overlay = Self::default();
        for pending in tables.mutations.values() {
            match pending.op.resolve(&tables.remap) {
                MutationOp::DeleteFolder { folder } => {
                    overlay.deleted_folders.insert(folder);
                }
                MutationOp::RenameFolder { folder, .. } => {
                    overlay.renamed_folders.insert(folder);
                }
                MutationOp::DeleteFeed { feed } => {
                    overlay.deleted_feeds.insert(feed);
                }
                MutationOp::RenameFeed { feed, .. } => {
                    overlay.renamed_feeds.insert(feed);
                }
                MutationOp::MoveFeed { feed, .. } => {
                    overlay.moved_feeds.insert(feed);
                }
                _ => {}
            }
        }
        overlay
    }
}

/// Merges `snapshot` into the transaction.
pub(crate) fn merge(txn: &mut WriteTxn, snapshot: ServerSnapshot) -> MergeReport {
    let overlay = PendingOverlay::collect(txn);
    let mut report = MergeReport::default();

    if let Some(folders) = snapshot.folders {
        merge_folders(txn, folders, &overlay, &mut report);
    }
    if let Some(feeds) = snapshot.feeds {
        merge_feeds(txn, feeds, &overlay, &mut report);
    }
    detach_orphaned_feeds(txn);

    let mut highest = snapshot.marker;
    for article in snapshot.articles {
        highest = highest.max(article.sync_marker);
        merge_article(txn, article, &overlay, &mut report);
    }

    txn.refresh_all_unread();
    let open = txn.tables().meta.pull_cursor;
    report.watermark = match (snapshot.resume_offset, open) {
        (Some(offset), Some(cursor)) => {
            txn.set_pull_cursor(Some(PullCursor { offset, ..cursor }));
            cursor.since
        }
        (Some(offset), None) => {
            let since = txn.tables().meta.watermark;
            txn.set_pull_cursor(Some(PullCursor {
                since,
                offset,
                ceiling: highest.max(since),
            }));
            since
        }
        (None, Some(cursor)) => {
            txn.set_pull_cursor(None);
            txn.advance_watermark(cursor.ceiling)
        }
        (None, None) => txn.advance_watermark(highest),
    };

    debug!(
        folders = report.folders_upserted,
        feeds = report.feeds_upserted,
        inserted = report.articles_inserted,
        updated = report.articles_updated,
        skipped = report.articles_skipped,
        watermark = report.watermark,
        "merged server snapshot"
    );
    report
}

fn merge_folders(
    txn: &mut WriteTxn,
    folders: Vec<Folder>,
    overlay: &PendingOverlay,
    report: &mut MergeReport,
) {
    let listed: BTreeSet<FolderId> = folders.iter().map(|f| f.id).collect();

    for mut folder in folders {
        if folder.id.is_placeholder() || overlay.deleted_folders.contains(&folder.id) {
            continue;
        }
        if folder.name.trim().is_empty() {
            warn!(folder = %folder.id, "ignoring server folder with empty name");
            continue;
        }
        if overlay.renamed_folders.contains(&folder.id) {
            if let Some(local) = txn.tables().folders.get(&folder.id) {
                folder.name.clone_from(&local.name);
            }
        }
        if txn.put_folder(folder) {
            report.folders_upserted += 1;
        }
    }

    let stale: Vec<FolderId> = txn
        .tables()
        .folders
        .keys()
        .filter(|id| !id.is_placeholder() && !listed.contains(id))
        .copied()
        .collect();
    for id in stale {
        txn.remove_folder(id);
        report.folders_removed += 1;
    }
}

fn merge_feeds(
    txn: &mut WriteTxn,
    feeds: Vec<Feed>,
    overlay: &PendingOverlay,
    report: &mut MergeReport,
) {
    let listed: BTreeSet<FeedId> = feeds.iter().map(|f| f.id).collect();

    for mut feed in feeds {
        if feed.id.is_placeholder() || overlay.deleted_feeds.contains(&feed.id) {
            continue;
        }
        if feed
            .folder_id
            .is_some_and(|folder| overlay.deleted_folders.contains(&folder))
        {
            continue;
        }

        if let Some(local) = txn.tables().feeds.get(&feed.id) {
            feed.unread_count = local.unread_count;
            if overlay.renamed_feeds.contains(&feed.id) {
                feed.title.clone_from(&local.title);
            }
            if overlay.moved_feeds.contains(&feed.id) {
                feed.folder_id = local.folder_id;
            }
        } else {
            feed.unread_count = 0;
        }

        if let Some(folder) = feed.folder_id {
            if !txn.tables().folders.contains_key(&folder) {
                warn!(feed = %feed.id, folder = %folder, "feed references unknown folder");
                feed.folder_id = None;
            }
        }

        if txn.put_feed(feed) {
            report.feeds_upserted += 1;
        }
    }

    let stale: Vec<FeedId> = txn
        .tables()
        .feeds
        .keys()
        .filter(|id| !id.is_placeholder() && !listed.contains(id))
        .copied()
        .collect();
    for id in stale {
        txn.remove_feed(id);
        report.feeds_removed += 1;
    }
}

/// Moves feeds whose folder disappeared to "no folder".
fn detach_orphaned_feeds(txn: &mut WriteTxn) {
    let orphaned: Vec<Feed> = txn
        .tables()
        .feeds
        .values()
        .filter(|feed| {
            feed.folder_id
                .is_some_and(|folder| !txn.tables().folders.contains_key(&folder))
        })
        .cloned()
        .collect();
    for mut feed in orphaned {
        debug!(feed = %feed.id, "detaching feed from removed folder");
        feed.folder_id = None;
        txn.put_feed(feed);
    }
}

fn merge_article(
    txn: &mut WriteTxn,
    incoming: Article,
    overlay: &PendingOverlay,
    report: &mut MergeReport,
) {
    if overlay.deleted_feeds.contains(&incoming.feed_id)
        || !txn.tables().feeds.contains_key(&incoming.feed_id)
    {
        report.articles_skipped += 1;
        return;
    }

    let merged = match txn.tables().articles.get(&incoming.id) {
        None => {
            if txn.put_article(incoming) {
                report.articles_inserted += 1;
            }
            return;
        }
        Some(local) if incoming.sync_marker > local.sync_marker => incoming,
        Some(local) => {
            if incoming.read != local.read || incoming.starred != local.starred {
                report.articles_kept_local += 1;
            }
            Article {
                read: local.read,
                starred: local.starred,
                sync_marker: local.sync_marker,
                ..incoming
            }
        }
    };

    if txn.put_article(merged) {
        report.articles_updated += 1;
    }
}
