//! End-to-end sync cycles against the in-memory News server.

use feedsync_api::{HttpClient, HttpRequest, HttpResponse, Method, TransportError};
use feedsync_core::{ArticleId, FeedId, MutationKind, Store, StoreConfig};
use feedsync_engine::{
    AccountConfig, AccountHandle, SyncConfig, SyncError, SyncErrorKind, SyncEvent, SyncOutcome,
    SyncState, SyncTrigger, Synchronizer, Validation,
};
use feedsync_testkit::{
    test_account, test_credentials, FakeNewsServer, Fault, LoopbackClient, TEST_PASSWORD,
    TEST_SERVER_URL, TEST_USERNAME,
};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::time::Duration;
use tempfile::TempDir;

struct Harness<C: HttpClient = LoopbackClient> {
    server: Arc<FakeNewsServer>,
    sync: Arc<Synchronizer<C>>,
    dir: TempDir,
}

impl<C: HttpClient> Harness<C> {
    fn store(&self) -> &Store {
        self.sync.store()
    }

    fn journal_path(&self) -> PathBuf {
        self.dir.path().join(test_account().as_str()).join("journal.log")
    }

    fn journal(&self) -> Vec<u8> {
        std::fs::read(self.journal_path()).unwrap()
    }

    fn completed(&self, trigger: SyncTrigger) -> feedsync_engine::CycleSummary {
        match self.sync.sync(trigger).unwrap() {
            SyncOutcome::Completed(summary) => summary,
            SyncOutcome::Coalesced => panic!("cycle was coalesced"),
        }
    }
}

fn config() -> SyncConfig {
    SyncConfig::default().with_timeout(Duration::from_secs(1))
}

fn open_store(dir: &TempDir) -> Arc<Store> {
    Arc::new(Store::open(dir.path(), test_account(), StoreConfig::default()).unwrap())
}

fn harness_with<C: HttpClient>(
    server: Arc<FakeNewsServer>,
    http: C,
    config: SyncConfig,
) -> Harness<C> {
    let dir = TempDir::new().unwrap();
    let account = AccountHandle::new(AccountConfig::new(TEST_SERVER_URL, test_credentials()));
    let sync = Synchronizer::new(Arc::new(account), open_store(&dir), http, config).unwrap();
    Harness {
        server,
        sync: Arc::new(sync),
        dir,
    }
}

fn harness(config: SyncConfig) -> Harness {
    let server = Arc::new(FakeNewsServer::new(TEST_USERNAME, TEST_PASSWORD));
    let http = LoopbackClient::new(Arc::clone(&server));
    harness_with(server, http, config)
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Blocks the first request until released.
struct Gated {
    inner: LoopbackClient,
    gate: Mutex<Option<mpsc::Receiver<()>>>,
}

impl HttpClient for Gated {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let gate = self.gate.lock().take();
        if let Some(release) = gate {
            let _ = release.recv();
        }
        self.inner.send(request)
    }
}

fn gated_harness() -> (Harness<Gated>, mpsc::Sender<()>) {
    let server = Arc::new(FakeNewsServer::new(TEST_USERNAME, TEST_PASSWORD));
    let (release, gate) = mpsc::channel();
    let http = Gated {
        inner: LoopbackClient::new(Arc::clone(&server)),
        gate: Mutex::new(Some(gate)),
    };
    (harness_with(server, http, config()), release)
}

fn wait_until_syncing<C: HttpClient>(sync: &Synchronizer<C>) {
    for _ in 0..1000 {
        if sync.is_syncing() {
            return;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    panic!("cycle never started");
}

#[test]
fn first_sync_populates_store() {
    let h = harness(config());
    let folder = h.server.add_folder("News");
    let feed = h.server.add_feed("https://a.example/rss", Some(folder));
    h.server.add_items(feed, 3);

    let summary = h.completed(SyncTrigger::User);
    assert_eq!(summary.folders_changed, 1);
    assert_eq!(summary.feeds_changed, 1);
    assert_eq!(summary.articles_inserted, 3);
    assert_eq!(summary.watermark, h.server.clock());

    let snapshot = h.store().snapshot();
    assert_eq!(snapshot.feed(FeedId::new(feed)).unwrap().unread_count, 3);
    assert_eq!(h.sync.account().capabilities().unwrap().version.major, 18);
}

#[test]
fn offline_mark_read_is_kept_and_confirmed() {
    let h = harness(config());
    let feed = h.server.add_feed("https://a.example/rss", None);
    let a123 = h.server.add_item(feed, "A123");
    h.completed(SyncTrigger::User);

    // Offline: the local toggle is queued and the cycle fails.
    h.server.set_offline(true);
    h.store().mark_article_read(ArticleId::new(a123), true).unwrap();
    assert!(h.sync.sync(SyncTrigger::Timer).is_err());
    assert!(h.store().snapshot().article(ArticleId::new(a123)).unwrap().read);

    // Back online, but the push endpoint is failing: the pull still runs and
    // must not revert the local toggle.
    h.server.clear_faults();
    h.server.fail_route(Method::Put, "items/read", Fault::Status(503));
    h.server.add_item(feed, "other");
    let summary = h.completed(SyncTrigger::Timer);
    assert!(summary.push_stalled);
    assert_eq!(summary.mutations_pending, 1);
    assert_eq!(summary.articles_inserted, 1);
    assert!(h.store().snapshot().article(ArticleId::new(a123)).unwrap().read);
    assert_eq!(
        h.store().snapshot().pending_mutations().next().unwrap().attempts,
        1
    );

    h.server.clear_faults();
    let summary = h.completed(SyncTrigger::Timer);
    assert_eq!(summary.mutations_confirmed, 1);
    assert_eq!(summary.mutations_pending, 0);
    assert!(!h.server.item(a123).unwrap().unread);
    assert!(h.store().snapshot().article(ArticleId::new(a123)).unwrap().read);
}

#[test]
fn paginated_pull_merges_every_page() {
    let h = harness(config().with_item_batch_size(50));
    let feed = h.server.add_feed("https://a.example/rss", None);
    h.server.add_items(feed, 150);

    let summary = h.completed(SyncTrigger::User);
    assert_eq!(summary.articles_inserted, 150);
    assert_eq!(summary.watermark, h.server.clock());
    assert_eq!(h.store().snapshot().watermark(), h.server.clock());
    // Three full pages and the final empty one.
    assert_eq!(h.server.request_count(Method::Get, "items/updated"), 4);
}

#[test]
fn item_cap_spreads_backlog_over_cycles_without_losing_items() {
    let h = harness(config().with_item_batch_size(20).with_max_items(60));
    let feed = h.server.add_feed("https://a.example/rss", None);
    h.server.add_items(feed, 100);

    let first = h.completed(SyncTrigger::Timer);
    assert_eq!(first.articles_inserted, 60);
    assert_eq!(first.watermark, 0);
    let cursor = h.store().snapshot().pull_cursor().unwrap();
    assert_eq!(cursor.since, 0);
    assert_eq!(cursor.ceiling, h.server.clock());

    // Arrives while the backlog is still being worked through.
    h.server.add_items(feed, 5);

    let second = h.completed(SyncTrigger::Timer);
    assert_eq!(second.articles_inserted, 40);
    assert_eq!(second.watermark, cursor.ceiling);
    assert!(h.store().snapshot().pull_cursor().is_none());

    let third = h.completed(SyncTrigger::Timer);
    assert_eq!(third.articles_inserted, 5);
    assert_eq!(third.watermark, h.server.clock());

    let fourth = h.completed(SyncTrigger::Timer);
    assert_eq!(fourth.articles_inserted, 0);
    assert_eq!(h.store().stats().articles, h.server.item_count());
    assert_eq!(h.server.item_count(), 105);
}

#[test]
fn invalid_credentials_abort_before_any_push_or_pull() {
    let h = harness(config());
    let feed = h.server.add_feed("https://a.example/rss", None);
    let item = h.server.add_item(feed, "one");
    h.completed(SyncTrigger::User);
    h.store().mark_article_read(ArticleId::new(item), true).unwrap();

    h.server.set_credentials(TEST_USERNAME, "rotated");
    h.server.clear_requests();
    let before = h.journal();
    let mut rx = h.sync.subscribe();

    let err = h.sync.sync(SyncTrigger::User).unwrap_err();
    assert!(matches!(err, SyncError::Authentication { .. }));
    assert_eq!(h.journal(), before);
    assert_eq!(h.store().snapshot().pending_mutations().count(), 1);
    assert_eq!(h.server.request_count(Method::Put, ""), 0);
    assert_eq!(h.server.request_count(Method::Get, "folders"), 0);

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        SyncEvent::Error {
            kind: SyncErrorKind::Authentication,
            ..
        }
    )));
    assert_eq!(h.sync.state(), SyncState::Idle);
}

#[test]
fn placeholder_dependents_wait_for_their_create() {
    let h = harness(config());
    let (folder, _) = h.store().create_folder("Tech").unwrap();
    let (feed, _) = h
        .store()
        .create_feed("https://tech.example/rss", Some(folder))
        .unwrap();
    h.store().rename_feed(feed, "Tech news").unwrap();
    assert!(folder.is_placeholder() && feed.is_placeholder());

    let ready = h.store().next_mutations(10);
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].op.kind(), MutationKind::CreateFolder);

    let summary = h.completed(SyncTrigger::User);
    assert_eq!(summary.mutations_confirmed, 3);
    assert_eq!(summary.mutations_pending, 0);

    let server_feed = &h.server.feeds()[0];
    assert_eq!(server_feed.title, "Tech news");
    let server_folder = *h.server.folders().keys().next().unwrap();
    assert_eq!(server_feed.folder_id, Some(server_folder));

    let snapshot = h.store().snapshot();
    assert_eq!(snapshot.stats().placeholders, 0);
    let local_feed = snapshot.feeds().next().unwrap();
    assert_eq!(local_feed.id.get(), server_feed.id);
    assert_eq!(local_feed.folder_id.map(|f| f.get()), Some(server_folder));
}

#[test]
fn interrupted_pull_leaves_store_identical() {
    let h = harness(config());
    let feed = h.server.add_feed("https://a.example/rss", None);
    h.server.add_items(feed, 5);
    h.completed(SyncTrigger::User);

    h.server.add_items(feed, 5);
    h.server.remove_feed(feed);
    h.server.fail_route(Method::Get, "items", Fault::Timeout);
    let before = h.journal();
    let watermark = h.store().snapshot().watermark();

    let err = h.sync.sync(SyncTrigger::Timer).unwrap_err();
    assert!(matches!(err, SyncError::Network { timed_out: true, .. }));
    assert!(err.is_retryable());
    assert_eq!(h.journal(), before);
    assert_eq!(h.store().snapshot().watermark(), watermark);
    assert_eq!(h.store().snapshot().articles().count(), 5);
}

#[test]
fn rejected_mutation_is_discarded_and_others_continue() {
    let h = harness(config());
    let gone = h.server.add_feed("https://gone.example/rss", None);
    let feed = h.server.add_feed("https://a.example/rss", None);
    let item = h.server.add_item(feed, "one");
    h.completed(SyncTrigger::User);

    h.server.remove_feed(gone);
    h.store().rename_feed(FeedId::new(gone), "Renamed").unwrap();
    h.store().mark_article_read(ArticleId::new(item), true).unwrap();

    let summary = h.completed(SyncTrigger::User);
    assert_eq!(summary.mutations_failed, 1);
    assert_eq!(summary.mutations_confirmed, 1);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].kind, MutationKind::RenameFeed);
    assert!(!h.server.item(item).unwrap().unread);
    assert!(h.store().snapshot().feed(FeedId::new(gone)).is_none());
    assert!(h.store().snapshot().failures().is_empty());
}

#[test]
fn create_conflict_adopts_existing_entity() {
    let h = harness(config());
    let (placeholder, _) = h.store().create_folder("News").unwrap();
    let existing = h.server.add_folder("News");

    let summary = h.completed(SyncTrigger::User);
    assert_eq!(summary.mutations_confirmed, 1);
    assert_eq!(h.server.folders().len(), 1);

    let snapshot = h.store().snapshot();
    assert!(snapshot.folder(placeholder).is_none());
    assert_eq!(snapshot.folders().count(), 1);
    assert_eq!(snapshot.folders().next().unwrap().id.get(), existing);
}

#[test]
fn star_uses_item_ids_on_new_servers() {
    let h = harness(config());
    let feed = h.server.add_feed("https://a.example/rss", None);
    let item = h.server.add_item(feed, "one");
    h.completed(SyncTrigger::User);

    h.store().star_article(ArticleId::new(item), true).unwrap();
    h.completed(SyncTrigger::User);

    let star = h
        .server
        .requests()
        .into_iter()
        .find(|r| r.path == "items/star/multiple")
        .unwrap();
    assert!(star.body.unwrap().contains("itemIds"));
    assert!(h.server.item(item).unwrap().starred);
}

#[test]
fn concurrent_trigger_is_coalesced() {
    let (h, release) = gated_harness();
    let sync = Arc::clone(&h.sync);
    let running = std::thread::spawn(move || sync.sync(SyncTrigger::Timer));

    wait_until_syncing(&h.sync);
    assert_eq!(
        h.sync.sync(SyncTrigger::User).unwrap(),
        SyncOutcome::Coalesced
    );

    release.send(()).unwrap();
    let outcome = running.join().unwrap().unwrap();
    assert!(matches!(outcome, SyncOutcome::Completed(_)));
    assert_eq!(h.sync.stats().cycles_completed, 1);
    assert_eq!(h.sync.stats().cycles_coalesced, 1);
}

#[test]
fn cancellation_stops_at_phase_boundary() {
    let (h, release) = gated_harness();
    let mut rx = h.sync.subscribe();
    let sync = Arc::clone(&h.sync);
    let running = std::thread::spawn(move || sync.sync(SyncTrigger::User));

    wait_until_syncing(&h.sync);
    h.sync.cancel();
    release.send(()).unwrap();

    let err = running.join().unwrap().unwrap_err();
    assert!(matches!(err, SyncError::Cancelled));
    assert_eq!(h.server.request_count(Method::Get, "folders"), 0);
    assert_eq!(h.sync.state(), SyncState::Idle);
    assert!(drain(&mut rx).iter().any(|e| matches!(
        e,
        SyncEvent::Error {
            kind: SyncErrorKind::Cancelled,
            ..
        }
    )));
}

#[test]
fn reconfigure_validates_then_syncs() {
    let server = Arc::new(FakeNewsServer::new(TEST_USERNAME, "new-password"));
    let h = harness_with(
        Arc::clone(&server),
        LoopbackClient::new(Arc::clone(&server)),
        config(),
    );
    assert!(h.sync.sync(SyncTrigger::User).is_err());

    let wrong = AccountConfig::new(
        TEST_SERVER_URL,
        feedsync_api::Credentials::new(TEST_USERNAME, "still-wrong"),
    );
    let (validation, outcome) = h.sync.reconfigure(&wrong).unwrap();
    assert_eq!(validation, Validation::InvalidCredentials);
    assert!(outcome.is_none());

    let right = AccountConfig::new(
        TEST_SERVER_URL,
        feedsync_api::Credentials::new(TEST_USERNAME, "new-password"),
    );
    let (validation, outcome) = h.sync.reconfigure(&right).unwrap();
    assert!(validation.is_valid());
    assert!(matches!(outcome, Some(SyncOutcome::Completed(_))));
    assert_eq!(h.sync.account().snapshot().credentials.password, "new-password");
}

#[test]
fn restart_resumes_from_watermark() {
    let h = harness(config());
    let feed = h.server.add_feed("https://a.example/rss", None);
    h.server.add_items(feed, 3);
    h.completed(SyncTrigger::User);
    let watermark = h.store().snapshot().watermark();

    let Harness { server, sync, dir } = h;
    drop(sync);

    server.add_items(feed, 2);
    server.clear_requests();
    let account = AccountHandle::new(AccountConfig::new(TEST_SERVER_URL, test_credentials()));
    let sync = Synchronizer::new(
        Arc::new(account),
        open_store(&dir),
        LoopbackClient::new(Arc::clone(&server)),
        config(),
    )
    .unwrap();

    match sync.sync(SyncTrigger::User).unwrap() {
        SyncOutcome::Completed(summary) => assert_eq!(summary.articles_inserted, 2),
        SyncOutcome::Coalesced => panic!("cycle was coalesced"),
    }
    let first_page = server
        .requests()
        .into_iter()
        .find(|r| r.path == "items/updated")
        .unwrap();
    assert!(first_page
        .query
        .unwrap()
        .contains(&format!("lastModified={watermark}")));
}
