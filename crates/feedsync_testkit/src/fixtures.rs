//! Test fixtures and store helpers.

use feedsync_api::Credentials;
use feedsync_core::{
    AccountId, Article, ArticleId, Feed, FeedId, Folder, FolderId, ServerSnapshot, Store,
    StoreConfig,
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Server URL used by fixtures.
pub const TEST_SERVER_URL: &str = "https://cloud.example.com";

/// Username used by fixtures.
pub const TEST_USERNAME: &str = "alice";

/// Password used by fixtures.
pub const TEST_PASSWORD: &str = "secret";

/// Returns the fixture credentials.
pub fn test_credentials() -> Credentials {
    Credentials::new(TEST_USERNAME, TEST_PASSWORD)
}

/// Returns the account id of the fixture credentials.
pub fn test_account() -> AccountId {
    AccountId::derive(TEST_SERVER_URL, TEST_USERNAME)
}

/// A file-backed test store with automatic cleanup.
pub struct TestStore {
    /// The store instance.
    pub store: Store,
    temp_dir: TempDir,
}

impl TestStore {
    /// Opens a store for [`test_account`] in a fresh temporary directory.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Opens a store with `config` in a fresh temporary directory.
    pub fn with_config(config: StoreConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = Store::open(temp_dir.path(), test_account(), config)
            .expect("Failed to open test store");
        Self { store, temp_dir }
    }

    /// Returns the root directory holding the account directory.
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Returns the account directory.
    pub fn account_dir(&self) -> PathBuf {
        self.temp_dir.path().join(test_account().as_str())
    }

    /// Closes the store and reopens it from disk.
    pub fn reopen(self) -> Self {
        let Self { store, temp_dir } = self;
        drop(store);
        let store = Store::open(temp_dir.path(), test_account(), StoreConfig::default())
            .expect("Failed to reopen test store");
        Self { store, temp_dir }
    }
}

impl Default for TestStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestStore {
    type Target = Store;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Opens an in-memory store for [`test_account`].
pub fn memory_store() -> Store {
    Store::open_in_memory(test_account()).expect("Failed to open in-memory store")
}

/// Builds an unread article with `marker` as its sync marker.
pub fn article(id: i64, feed: i64, marker: u64) -> Article {
    Article {
        id: ArticleId::new(id),
        feed_id: FeedId::new(feed),
        guid_hash: format!("guid-{id}"),
        title: format!("Article {id}"),
        author: None,
        url: Some(format!("https://example.com/items/{id}")),
        body: format!("<p>Article {id}</p>"),
        published_at: 1_700_000_000 + id,
        last_modified: 1_700_000_000 + id,
        read: false,
        starred: false,
        sync_marker: marker,
    }
}

/// A snapshot with folder 1 "News", feed 10 inside it, and `articles`
/// unread articles with ids and markers `100..`.
pub fn seeded_snapshot(articles: usize) -> ServerSnapshot {
    let items = (0..articles as i64)
        .map(|n| article(100 + n, 10, 100 + n as u64))
        .collect();
    ServerSnapshot::new()
        .with_folders(vec![Folder::new(FolderId::new(1), "News")])
        .with_feeds(vec![
            Feed::new(FeedId::new(10), Some(FolderId::new(1)), "https://a.example/rss")
                .with_title("A"),
        ])
        .with_articles(items)
}

/// Runs `f` with a temporary file-backed store.
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&Store) -> R,
{
    let store = TestStore::new();
    f(&store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_snapshot_merges() {
        with_temp_store(|store| {
            let report = store.upsert_from_server(seeded_snapshot(3)).unwrap();
            assert_eq!(report.articles_inserted, 3);
            assert_eq!(store.stats().unread, 3);
        });
    }

    #[test]
    fn reopen_keeps_data() {
        let store = TestStore::new();
        store.upsert_from_server(seeded_snapshot(2)).unwrap();
        let store = store.reopen();
        assert_eq!(store.snapshot().articles().count(), 2);
        assert!(store.account_dir().join("journal.log").exists());
    }
}
