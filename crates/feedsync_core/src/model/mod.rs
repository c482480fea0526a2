//! Data model: folders, feeds, articles, and pending mutations.

mod entities;
mod ids;
mod mutation;

pub use entities::{Article, Feed, Folder};
pub use ids::{AccountId, ArticleId, FeedId, FolderId, MutationHandle};
pub use mutation::{
    FailureDisposition, MutationFailure, MutationKind, MutationOp, PendingMutation,
    ReadyMutation, RemapTable, TargetKey,
};

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time in unix seconds.
pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
