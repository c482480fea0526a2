//! Restart and crash-recovery behaviour of the file-backed store.

use feedsync_core::storage::{MemoryBackend, StorageBackend, StorageError, StorageResult};
use feedsync_core::{
    AccountId, Article, ArticleId, Feed, FeedId, Folder, FolderId, ServerSnapshot, Store,
    StoreConfig, StoreError,
};
use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::sync::Arc;
use tempfile::tempdir;

fn account() -> AccountId {
    AccountId::derive("https://cloud.example.com", "alice")
}

fn article(id: i64, feed: i64, marker: u64) -> Article {
    Article {
        id: ArticleId::new(id),
        feed_id: FeedId::new(feed),
        guid_hash: format!("guid-{id}"),
        title: format!("Article {id}"),
        author: Some("Author".into()),
        url: Some(format!("https://a.example/{id}")),
        body: "<p>hello</p>".into(),
        published_at: 1_700_000_000 + id,
        last_modified: 1_700_000_000 + id,
        read: false,
        starred: false,
        sync_marker: marker,
    }
}

fn server_state() -> ServerSnapshot {
    ServerSnapshot::new()
        .with_folders(vec![Folder::new(FolderId::new(1), "News")])
        .with_feeds(vec![Feed::new(
            FeedId::new(10),
            Some(FolderId::new(1)),
            "https://a.example/rss",
        )
        .with_title("A")])
        .with_articles((1..=5).map(|i| article(i, 10, i as u64)).collect())
}

#[test]
fn state_survives_reopen() {
    let root = tempdir().unwrap();

    {
        let store = Store::open(root.path(), account(), StoreConfig::default()).unwrap();
        store.upsert_from_server(server_state()).unwrap();
        store.mark_article_read(ArticleId::new(3), true).unwrap();
        store.create_folder("Tech").unwrap();
    }

    let store = Store::open(root.path(), account(), StoreConfig::default()).unwrap();
    let snapshot = store.snapshot();
    assert_eq!(store.watermark(&account()).unwrap(), 5);
    assert!(snapshot.article(ArticleId::new(3)).unwrap().read);
    assert_eq!(snapshot.feed(FeedId::new(10)).unwrap().unread_count, 4);
    assert_eq!(snapshot.pending_mutations().count(), 2);
    assert_eq!(snapshot.folders().count(), 2);

    // Handles and placeholders keep counting from where they stopped.
    let (folder, handle) = store.create_folder("Science").unwrap();
    assert_eq!(folder, FolderId::new(-2));
    assert_eq!(handle.get(), 3);
}

#[test]
fn torn_write_is_discarded_on_reopen() {
    let root = tempdir().unwrap();
    let journal = {
        let store = Store::open(root.path(), account(), StoreConfig::default()).unwrap();
        store.upsert_from_server(server_state()).unwrap();
        root.path().join(account().as_str()).join("journal.log")
    };

    let mut file = OpenOptions::new().append(true).open(&journal).unwrap();
    file.write_all(b"FSJL\x01\x00\x01\xff\xff").unwrap();
    drop(file);

    let store = Store::open(root.path(), account(), StoreConfig::default()).unwrap();
    assert_eq!(store.stats().articles, 5);
    store.mark_article_read(ArticleId::new(1), true).unwrap();
    drop(store);

    let store = Store::open(root.path(), account(), StoreConfig::default()).unwrap();
    assert!(store.snapshot().article(ArticleId::new(1)).unwrap().read);
}

#[test]
fn compaction_keeps_state_across_reopen() {
    let root = tempdir().unwrap();
    let config = StoreConfig::default()
        .compaction_threshold(256)
        .compaction_min_records(2);

    let before = {
        let store = Store::open(root.path(), account(), config.clone()).unwrap();
        store.upsert_from_server(server_state()).unwrap();
        for id in 1..=5 {
            store.star_article(ArticleId::new(id), true).unwrap();
        }
        store.stats()
    };

    let store = Store::open(root.path(), account(), config).unwrap();
    assert_eq!(store.stats(), before);
    assert_eq!(before.starred, 5);
}

#[test]
fn partial_item_fetch_cursor_survives_reopen() {
    let root = tempdir().unwrap();
    {
        let store = Store::open(root.path(), account(), StoreConfig::default()).unwrap();
        store
            .upsert_from_server(server_state().with_resume_offset(1))
            .unwrap();
    }

    let store = Store::open(root.path(), account(), StoreConfig::default()).unwrap();
    let cursor = store.snapshot().pull_cursor().unwrap();
    assert_eq!(cursor.since, 0);
    assert_eq!(cursor.offset, 1);
    assert_eq!(cursor.ceiling, 5);
    assert_eq!(store.watermark(&account()).unwrap(), 0);
}

#[test]
fn store_is_locked_while_open() {
    let root = tempdir().unwrap();
    let _store = Store::open(root.path(), account(), StoreConfig::default()).unwrap();
    let second = Store::open(root.path(), account(), StoreConfig::default());
    assert!(matches!(second, Err(StoreError::Locked)));
}

#[test]
fn accounts_are_kept_apart() {
    let root = tempdir().unwrap();
    let bob = AccountId::derive("https://cloud.example.com", "bob");

    let alice_store = Store::open(root.path(), account(), StoreConfig::default()).unwrap();
    alice_store.upsert_from_server(server_state()).unwrap();
    let bob_store = Store::open(root.path(), bob, StoreConfig::default()).unwrap();

    assert_eq!(alice_store.stats().articles, 5);
    assert_eq!(bob_store.stats().articles, 0);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    None,
    /// The next `sync` fails.
    Sync,
    /// The next `append` writes half its bytes, then fails.
    ShortAppend,
}

/// Memory backend that fails one operation on demand.
struct FaultyBackend {
    inner: MemoryBackend,
    fault: Arc<Mutex<Fault>>,
}

impl FaultyBackend {
    fn new(inner: MemoryBackend) -> (Self, Arc<Mutex<Fault>>) {
        let fault = Arc::new(Mutex::new(Fault::None));
        let backend = Self {
            inner,
            fault: Arc::clone(&fault),
        };
        (backend, fault)
    }

    fn take(&self, fault: Fault) -> bool {
        let mut current = self.fault.lock();
        if *current == fault {
            *current = Fault::None;
            true
        } else {
            false
        }
    }
}

impl StorageBackend for FaultyBackend {
    fn read_all(&self) -> StorageResult<Vec<u8>> {
        self.inner.read_all()
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        if self.take(Fault::ShortAppend) {
            self.inner.append(&data[..data.len() / 2])?;
            return Err(StorageError::Io(io::Error::other("disk full")));
        }
        self.inner.append(data)
    }

    fn sync(&mut self) -> StorageResult<()> {
        if self.take(Fault::Sync) {
            return Err(StorageError::Io(io::Error::other("disk full")));
        }
        self.inner.sync()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.inner.truncate(new_size)
    }

    fn replace(&mut self, data: &[u8]) -> StorageResult<()> {
        self.inner.replace(data)
    }
}

fn open_faulty(bytes: &MemoryBackend) -> (Store, Arc<Mutex<Fault>>) {
    let (backend, fault) = FaultyBackend::new(bytes.clone());
    let store =
        Store::open_with_backend(account(), StoreConfig::default(), Box::new(backend)).unwrap();
    (store, fault)
}

fn reopen(bytes: &MemoryBackend) -> Store {
    Store::open_with_backend(account(), StoreConfig::default(), Box::new(bytes.clone())).unwrap()
}

#[test]
fn failed_sync_is_not_replayed() {
    let bytes = MemoryBackend::new();
    let (store, fault) = open_faulty(&bytes);
    store.upsert_from_server(server_state()).unwrap();
    let journal_len = bytes.bytes().len();

    *fault.lock() = Fault::Sync;
    let result = store.create_folder("Tech");
    assert!(matches!(result, Err(StoreError::Storage(StorageError::Io(_)))));
    assert_eq!(store.snapshot().folders().count(), 1);
    assert_eq!(store.snapshot().pending_mutations().count(), 0);
    assert_eq!(bytes.bytes().len(), journal_len);

    store.mark_article_read(ArticleId::new(2), true).unwrap();
    drop(store);

    let store = reopen(&bytes);
    let snapshot = store.snapshot();
    assert_eq!(snapshot.folders().count(), 1);
    assert!(snapshot.article(ArticleId::new(2)).unwrap().read);
    assert_eq!(snapshot.pending_mutations().count(), 1);
}

#[test]
fn short_append_does_not_hide_later_commits() {
    let bytes = MemoryBackend::new();
    let (store, fault) = open_faulty(&bytes);
    store.upsert_from_server(server_state()).unwrap();

    *fault.lock() = Fault::ShortAppend;
    assert!(store.star_article(ArticleId::new(1), true).is_err());
    assert!(!store.snapshot().article(ArticleId::new(1)).unwrap().starred);

    store.star_article(ArticleId::new(4), true).unwrap();
    store.create_folder("Tech").unwrap();
    let live = store.stats();
    drop(store);

    let store = reopen(&bytes);
    assert_eq!(store.stats().starred, 1);
    assert!(store.snapshot().article(ArticleId::new(4)).unwrap().starred);
    assert_eq!(store.stats().folders, live.folders);
    assert_eq!(store.stats().pending_mutations, live.pending_mutations);
}

#[test]
fn failed_write_keeps_outstanding_snapshot_intact() {
    let bytes = MemoryBackend::new();
    let (store, fault) = open_faulty(&bytes);
    store.upsert_from_server(server_state()).unwrap();
    let before = store.snapshot();

    *fault.lock() = Fault::Sync;
    assert!(store.delete_feed(FeedId::new(10)).is_err());
    store.mark_article_read(ArticleId::new(1), true).unwrap();

    assert_eq!(before.stats().articles, 5);
    assert!(!before.article(ArticleId::new(1)).unwrap().read);
    assert!(store.snapshot().article(ArticleId::new(1)).unwrap().read);
    assert_eq!(store.stats().feeds, 1);
}
