//! Property-based test generators using proptest.
//!
//! Strategies produce server snapshots that keep referential integrity
//! (every article belongs to a listed feed) and sequences of local actions
//! that can be replayed against a [`Store`].

use crate::fixtures::article;
use feedsync_core::{
    Article, ArticleId, Feed, FeedId, Folder, FolderId, ServerSnapshot, Store, StoreResult,
};
use proptest::prelude::*;

/// Feed ids used by [`server_snapshot_strategy`].
pub const GENERATED_FEEDS: [i64; 3] = [10, 11, 12];

/// Strategy for server-assigned article ids.
pub fn article_id_strategy() -> impl Strategy<Value = ArticleId> {
    (1i64..200).prop_map(ArticleId::new)
}

/// Strategy for non-zero sync markers.
pub fn marker_strategy() -> impl Strategy<Value = u64> {
    1u64..10_000
}

/// Strategy for articles belonging to one of [`GENERATED_FEEDS`].
pub fn article_strategy() -> impl Strategy<Value = Article> {
    (
        article_id_strategy(),
        prop::sample::select(GENERATED_FEEDS.to_vec()),
        marker_strategy(),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(|(id, feed, marker, read, starred)| Article {
            read,
            starred,
            ..article(id.get(), feed, marker)
        })
}

/// Strategy for complete snapshots: one folder, [`GENERATED_FEEDS`], and
/// up to 64 articles with distinct ids.
pub fn server_snapshot_strategy() -> impl Strategy<Value = ServerSnapshot> {
    prop::collection::btree_map(article_id_strategy(), article_strategy(), 0..64).prop_map(
        |articles| {
            let articles = articles
                .into_iter()
                .map(|(id, article)| Article { id, ..article })
                .collect();
            ServerSnapshot::new()
                .with_folders(vec![Folder::new(FolderId::new(1), "News")])
                .with_feeds(
                    GENERATED_FEEDS
                        .iter()
                        .map(|id| {
                            let url = format!("https://f{id}.example/rss");
                            Feed::new(FeedId::new(*id), Some(FolderId::new(1)), url)
                        })
                        .collect(),
                )
                .with_articles(articles)
        },
    )
}

/// A user action applied to a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalAction {
    /// Mark an article read or unread.
    MarkRead(ArticleId, bool),
    /// Star or unstar an article.
    Star(ArticleId, bool),
    /// Mark a whole feed read.
    MarkFeedRead(FeedId),
    /// Rename a feed.
    RenameFeed(FeedId, String),
}

impl LocalAction {
    /// Applies the action. Actions on unknown entities are ignored.
    ///
    /// # Errors
    ///
    /// Returns any storage error from the store.
    pub fn apply(&self, store: &Store) -> StoreResult<()> {
        let snapshot = store.snapshot();
        match self {
            LocalAction::MarkRead(id, read) => {
                if snapshot.article(*id).is_some() {
                    store.mark_article_read(*id, *read)?;
                }
            }
            LocalAction::Star(id, starred) => {
                if snapshot.article(*id).is_some() {
                    store.star_article(*id, *starred)?;
                }
            }
            LocalAction::MarkFeedRead(feed) => {
                if snapshot.feed(*feed).is_some() {
                    store.mark_feed_read(*feed)?;
                }
            }
            LocalAction::RenameFeed(feed, title) => {
                if snapshot.feed(*feed).is_some() {
                    store.rename_feed(*feed, title)?;
                }
            }
        }
        Ok(())
    }
}

/// Strategy for a single local action.
pub fn local_action_strategy() -> impl Strategy<Value = LocalAction> {
    let feed = prop::sample::select(GENERATED_FEEDS.to_vec()).prop_map(FeedId::new);
    prop_oneof![
        4 => (article_id_strategy(), any::<bool>()).prop_map(|(id, read)| LocalAction::MarkRead(id, read)),
        2 => (article_id_strategy(), any::<bool>()).prop_map(|(id, starred)| LocalAction::Star(id, starred)),
        1 => feed.clone().prop_map(LocalAction::MarkFeedRead),
        1 => (feed, "[A-Z][a-z]{2,12}").prop_map(|(id, title)| LocalAction::RenameFeed(id, title)),
    ]
}

/// Strategy for a sequence of local actions.
pub fn local_actions_strategy() -> impl Strategy<Value = Vec<LocalAction>> {
    prop::collection::vec(local_action_strategy(), 0..40)
}
