//! Pending mutations: local intents waiting for server confirmation.

use super::ids::{ArticleId, FeedId, FolderId, MutationHandle};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A local change to replay against the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationOp {
    /// Mark one article read or unread.
    MarkRead {
        /// Target article.
        article: ArticleId,
        /// New read state.
        read: bool,
    },
    /// Star or unstar one article.
    Star {
        /// Target article.
        article: ArticleId,
        /// Feed of the article (the star endpoint addresses items by feed and guid hash).
        feed: FeedId,
        /// Guid hash of the article.
        guid_hash: String,
        /// New starred state.
        starred: bool,
    },
    /// Create a folder that currently exists locally under a placeholder id.
    CreateFolder {
        /// Placeholder the folder lives under until confirmed.
        placeholder: FolderId,
        /// Folder name.
        name: String,
    },
    /// Rename a folder.
    RenameFolder {
        /// Target folder.
        folder: FolderId,
        /// New name.
        name: String,
    },
    /// Delete a folder and its feeds.
    DeleteFolder {
        /// Target folder.
        folder: FolderId,
    },
    /// Subscribe to a feed that currently exists locally under a placeholder id.
    CreateFeed {
        /// Placeholder the feed lives under until confirmed.
        placeholder: FeedId,
        /// Feed URL.
        url: String,
        /// Parent folder.
        folder: Option<FolderId>,
    },
    /// Move a feed to another folder (or out of any folder).
    MoveFeed {
        /// Target feed.
        feed: FeedId,
        /// New parent folder.
        folder: Option<FolderId>,
    },
    /// Rename a feed.
    RenameFeed {
        /// Target feed.
        feed: FeedId,
        /// New title.
        title: String,
    },
    /// Unsubscribe from a feed.
    DeleteFeed {
        /// Target feed.
        feed: FeedId,
    },
    /// Mark every article of a feed up to `newest` read.
    MarkFeedRead {
        /// Target feed.
        feed: FeedId,
        /// Newest article id known locally when the action was taken.
        newest: ArticleId,
    },
}

/// Kind of a [`MutationOp`], for logs and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationKind {
    /// [`MutationOp::MarkRead`] with `read = true`.
    MarkRead,
    /// [`MutationOp::MarkRead`] with `read = false`.
    MarkUnread,
    /// [`MutationOp::Star`] with `starred = true`.
    Star,
    /// [`MutationOp::Star`] with `starred = false`.
    Unstar,
    /// [`MutationOp::CreateFolder`].
    CreateFolder,
    /// [`MutationOp::RenameFolder`].
    RenameFolder,
    /// [`MutationOp::DeleteFolder`].
    DeleteFolder,
    /// [`MutationOp::CreateFeed`].
    CreateFeed,
    /// [`MutationOp::MoveFeed`].
    MoveFeed,
    /// [`MutationOp::RenameFeed`].
    RenameFeed,
    /// [`MutationOp::DeleteFeed`].
    DeleteFeed,
    /// [`MutationOp::MarkFeedRead`].
    MarkFeedRead,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MutationKind::MarkRead => "mark-read",
            MutationKind::MarkUnread => "mark-unread",
            MutationKind::Star => "star",
            MutationKind::Unstar => "unstar",
            MutationKind::CreateFolder => "create-folder",
            MutationKind::RenameFolder => "rename-folder",
            MutationKind::DeleteFolder => "delete-folder",
            MutationKind::CreateFeed => "create-feed",
            MutationKind::MoveFeed => "move-feed",
            MutationKind::RenameFeed => "rename-feed",
            MutationKind::DeleteFeed => "delete-feed",
            MutationKind::MarkFeedRead => "mark-feed-read",
        };
        f.write_str(name)
    }
}

/// The entity a mutation acts on. Mutations on the same target replay in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TargetKey {
    /// An article.
    Article(ArticleId),
    /// A folder.
    Folder(FolderId),
    /// A feed.
    Feed(FeedId),
}

/// Maps placeholder ids to the ids the server assigned.
pub type RemapTable = BTreeMap<i64, i64>;

fn remap_folder(id: FolderId, remap: &RemapTable) -> FolderId {
    remap.get(&id.get()).map_or(id, |&real| FolderId::new(real))
}

fn remap_feed(id: FeedId, remap: &RemapTable) -> FeedId {
    remap.get(&id.get()).map_or(id, |&real| FeedId::new(real))
}

impl MutationOp {
    /// Returns the kind of this operation.
    #[must_use]
    pub fn kind(&self) -> MutationKind {
        match self {
            MutationOp::MarkRead { read: true, .. } => MutationKind::MarkRead,
            MutationOp::MarkRead { read: false, .. } => MutationKind::MarkUnread,
            MutationOp::Star { starred: true, .. } => MutationKind::Star,
            MutationOp::Star { starred: false, .. } => MutationKind::Unstar,
            MutationOp::CreateFolder { .. } => MutationKind::CreateFolder,
            MutationOp::RenameFolder { .. } => MutationKind::RenameFolder,
            MutationOp::DeleteFolder { .. } => MutationKind::DeleteFolder,
            MutationOp::CreateFeed { .. } => MutationKind::CreateFeed,
            MutationOp::MoveFeed { .. } => MutationKind::MoveFeed,
            MutationOp::RenameFeed { .. } => MutationKind::RenameFeed,
            MutationOp::DeleteFeed { .. } => MutationKind::DeleteFeed,
            MutationOp::MarkFeedRead { .. } => MutationKind::MarkFeedRead,
        }
    }

    /// Returns the entity this operation acts on.
    #[must_use]
    pub fn target(&self) -> TargetKey {
        match self {
            MutationOp::MarkRead { article, .. } | MutationOp::Star { article, .. } => {
                TargetKey::Article(*article)
            }
            MutationOp::CreateFolder { placeholder, .. } => TargetKey::Folder(*placeholder),
            MutationOp::RenameFolder { folder, .. } | MutationOp::DeleteFolder { folder } => {
                TargetKey::Folder(*folder)
            }
            MutationOp::CreateFeed { placeholder, .. } => TargetKey::Feed(*placeholder),
            MutationOp::MoveFeed { feed, .. }
            | MutationOp::RenameFeed { feed, .. }
            | MutationOp::DeleteFeed { feed }
            | MutationOp::MarkFeedRead { feed, .. } => TargetKey::Feed(*feed),
        }
    }

    /// Returns the placeholder this operation creates, if any.
    #[must_use]
    pub fn creates(&self) -> Option<i64> {
        match self {
            MutationOp::CreateFolder { placeholder, .. } => Some(placeholder.get()),
            MutationOp::CreateFeed { placeholder, .. } => Some(placeholder.get()),
            _ => None,
        }
    }

    /// Returns the placeholder ids this operation depends on.
    ///
    /// The placeholder an operation creates is not a dependency of itself.
    #[must_use]
    pub fn dependencies(&self) -> Vec<i64> {
        let mut deps = Vec::new();
        match self {
            MutationOp::MarkRead { .. } | MutationOp::CreateFolder { .. } => {}
            MutationOp::Star { feed, .. } => push_feed(&mut deps, *feed),
            MutationOp::RenameFolder { folder, .. } | MutationOp::DeleteFolder { folder } => {
                push_folder(&mut deps, Some(*folder));
            }
            MutationOp::CreateFeed { folder, .. } => push_folder(&mut deps, *folder),
            MutationOp::MoveFeed { feed, folder } => {
                push_feed(&mut deps, *feed);
                push_folder(&mut deps, *folder);
            }
            MutationOp::RenameFeed { feed, .. }
            | MutationOp::DeleteFeed { feed }
            | MutationOp::MarkFeedRead { feed, .. } => push_feed(&mut deps, *feed),
        }
        deps
    }

    /// Returns true if this operation references the raw id `id`.
    #[must_use]
    pub fn references(&self, id: i64) -> bool {
        self.creates() == Some(id) || self.dependencies().contains(&id)
    }

    /// Rewrites every confirmed placeholder reference through `remap`.
    #[must_use]
    pub fn resolve(&self, remap: &RemapTable) -> MutationOp {
        let mut op = self.clone();
        match &mut op {
            MutationOp::MarkRead { .. } | MutationOp::CreateFolder { .. } => {}
            MutationOp::Star { feed, .. } => *feed = remap_feed(*feed, remap),
            MutationOp::RenameFolder { folder, .. } | MutationOp::DeleteFolder { folder } => {
                *folder = remap_folder(*folder, remap);
            }
            MutationOp::CreateFeed { folder, .. } => {
                *folder = folder.map(|f| remap_folder(f, remap));
            }
            MutationOp::MoveFeed { feed, folder } => {
                *feed = remap_feed(*feed, remap);
                *folder = folder.map(|f| remap_folder(f, remap));
            }
            MutationOp::RenameFeed { feed, .. }
            | MutationOp::DeleteFeed { feed }
            | MutationOp::MarkFeedRead { feed, .. } => *feed = remap_feed(*feed, remap),
        }
        op
    }
}

fn push_folder(deps: &mut Vec<i64>, folder: Option<FolderId>) {
    if let Some(folder) = folder.filter(|f| f.is_placeholder()) {
        deps.push(folder.get());
    }
}

fn push_feed(deps: &mut Vec<i64>, feed: FeedId) {
    if feed.is_placeholder() {
        deps.push(feed.get());
    }
}

/// A queued mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMutation {
    /// Handle, increasing with creation order.
    pub handle: MutationHandle,
    /// The operation as enqueued (placeholder references are not rewritten).
    pub op: MutationOp,
    /// Number of failed, retryable push attempts so far.
    pub attempts: u32,
    /// Enqueue time (unix seconds).
    pub created_at: i64,
}

/// A mutation ready to be pushed, with placeholder references resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyMutation {
    /// Handle to confirm or fail.
    pub handle: MutationHandle,
    /// Operation with confirmed ids substituted for placeholders.
    pub op: MutationOp,
    /// Number of failed, retryable push attempts so far.
    pub attempts: u32,
}

/// Record of a mutation discarded after a non-retryable failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationFailure {
    /// Handle of the discarded mutation.
    pub handle: MutationHandle,
    /// What the mutation did.
    pub kind: MutationKind,
    /// Why it was discarded.
    pub reason: String,
    /// Time of discard (unix seconds).
    pub failed_at: i64,
}

/// How a failed push should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Keep the mutation queued and count the attempt.
    Retry,
    /// Discard the mutation and record a failure for the UI.
    Discard,
}
