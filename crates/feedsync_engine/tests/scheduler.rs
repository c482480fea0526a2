//! Periodic scheduling and backoff.

use feedsync_core::{Store, StoreConfig};
use feedsync_engine::{
    AccountConfig, AccountHandle, PeriodicSync, RetryConfig, SyncConfig, SyncEvent, Synchronizer,
};
use feedsync_testkit::{
    test_account, test_credentials, FakeNewsServer, LoopbackClient, TEST_SERVER_URL,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn synchronizer(
    server: &Arc<FakeNewsServer>,
    dir: &TempDir,
    config: SyncConfig,
) -> Arc<Synchronizer<LoopbackClient>> {
    let store = Store::open(dir.path(), test_account(), StoreConfig::default()).unwrap();
    let account = AccountHandle::new(AccountConfig::new(TEST_SERVER_URL, test_credentials()));
    Arc::new(
        Synchronizer::new(
            Arc::new(account),
            Arc::new(store),
            LoopbackClient::new(Arc::clone(server)),
            config,
        )
        .unwrap(),
    )
}

async fn wait_for(mut done: impl FnMut() -> bool) {
    for _ in 0..500 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn runs_cycles_on_interval() {
    let server = Arc::new(FakeNewsServer::default());
    let feed = server.add_feed("https://a.example/rss", None);
    server.add_items(feed, 2);
    let dir = TempDir::new().unwrap();
    let sync = synchronizer(
        &server,
        &dir,
        SyncConfig::default().with_sync_interval(Duration::from_millis(20)),
    );
    let mut events = sync.subscribe();

    let scheduler = PeriodicSync::spawn(Arc::clone(&sync));
    wait_for(|| sync.stats().cycles_completed >= 3).await;
    scheduler.shutdown().await;

    assert_eq!(sync.store().snapshot().articles().count(), 2);
    assert!(!sync.is_syncing());
    let first = events.recv().await.unwrap();
    assert!(matches!(first, SyncEvent::CycleStarted { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn backs_off_then_recovers() {
    let server = Arc::new(FakeNewsServer::default());
    server.set_offline(true);
    let dir = TempDir::new().unwrap();
    let sync = synchronizer(
        &server,
        &dir,
        SyncConfig::default()
            .with_sync_interval(Duration::from_secs(3600))
            .with_retry(
                RetryConfig::new(Duration::from_millis(5))
                    .with_max_delay(Duration::from_millis(20))
                    .with_jitter(false),
            ),
    );

    let scheduler = PeriodicSync::spawn(Arc::clone(&sync));
    wait_for(|| sync.stats().cycles_failed >= 3).await;

    server.set_offline(false);
    wait_for(|| sync.stats().cycles_completed == 1).await;
    // After a success the regular hour-long interval applies again.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(sync.stats().cycles_completed, 1);
    assert!(sync.stats().last_error.is_none());

    scheduler.shutdown().await;
}
