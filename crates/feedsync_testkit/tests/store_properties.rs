//! Property tests for merge and queue invariants.

use feedsync_core::{Article, ArticleId, Store};
use feedsync_testkit::generators::*;
use feedsync_testkit::{memory_store, TestStore};
use proptest::prelude::*;
use std::collections::BTreeMap;

fn flags(store: &Store) -> BTreeMap<ArticleId, (bool, bool)> {
    store
        .snapshot()
        .articles()
        .map(|a| (a.id, (a.read, a.starred)))
        .collect()
}

fn articles(store: &Store) -> Vec<Article> {
    store.snapshot().articles().cloned().collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn upsert_is_idempotent(snapshot in server_snapshot_strategy()) {
        let store = memory_store();
        store.upsert_from_server(snapshot.clone()).unwrap();
        let before = articles(&store);

        let report = store.upsert_from_server(snapshot).unwrap();
        prop_assert!(report.is_unchanged(), "second merge changed {:?}", report);
        prop_assert_eq!(articles(&store), before);
    }

    #[test]
    fn local_flags_survive_remerge_at_same_marker(
        snapshot in server_snapshot_strategy(),
        actions in local_actions_strategy(),
    ) {
        let store = memory_store();
        store.upsert_from_server(snapshot.clone()).unwrap();
        for action in &actions {
            action.apply(&store).unwrap();
        }
        let local = flags(&store);

        store.upsert_from_server(snapshot).unwrap();
        prop_assert_eq!(flags(&store), local);
    }

    #[test]
    fn newer_marker_replaces_local_flags(
        snapshot in server_snapshot_strategy(),
        actions in local_actions_strategy(),
    ) {
        let store = memory_store();
        store.upsert_from_server(snapshot.clone()).unwrap();
        for action in &actions {
            action.apply(&store).unwrap();
        }

        let watermark = store.snapshot().watermark();
        let bumped: Vec<Article> = articles(&store)
            .into_iter()
            .map(|a| Article {
                read: !a.read,
                sync_marker: watermark + 1,
                ..a
            })
            .collect();
        let expected: BTreeMap<_, _> = bumped.iter().map(|a| (a.id, (a.read, a.starred))).collect();

        let report = store
            .upsert_from_server(feedsync_core::ServerSnapshot::new().with_articles(bumped))
            .unwrap();
        prop_assert_eq!(flags(&store), expected);
        prop_assert!(report.watermark >= watermark);
    }

    #[test]
    fn queue_hands_out_in_creation_order(
        snapshot in server_snapshot_strategy(),
        actions in local_actions_strategy(),
    ) {
        let store = memory_store();
        store.upsert_from_server(snapshot).unwrap();
        for action in &actions {
            action.apply(&store).unwrap();
        }

        let pending = store.snapshot().pending_mutations().count();
        let ready = store.next_mutations(usize::MAX);
        prop_assert_eq!(ready.len(), pending);
        prop_assert!(ready.windows(2).all(|w| w[0].handle < w[1].handle));

        if let Some(first) = ready.first() {
            prop_assert_eq!(&store.next_mutations(1)[0].op, &first.op);
        }
    }

    #[test]
    fn watermark_is_max_marker_seen(
        first in server_snapshot_strategy(),
        second in server_snapshot_strategy(),
    ) {
        let store = memory_store();
        let highest = |s: &feedsync_core::ServerSnapshot| s.marker;
        let expected = highest(&first).max(highest(&second));

        store.upsert_from_server(first).unwrap();
        let report = store.upsert_from_server(second).unwrap();
        prop_assert_eq!(report.watermark, expected);
        prop_assert_eq!(store.snapshot().watermark(), expected);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn reopened_store_matches(
        snapshot in server_snapshot_strategy(),
        actions in local_actions_strategy(),
    ) {
        let store = TestStore::new();
        store.upsert_from_server(snapshot).unwrap();
        for action in &actions {
            action.apply(&store).unwrap();
        }
        let before_articles = articles(&store);
        let before_queue: Vec<_> = store.snapshot().pending_mutations().cloned().collect();

        let store = store.reopen();
        prop_assert_eq!(articles(&store), before_articles);
        let after_queue: Vec<_> = store.snapshot().pending_mutations().cloned().collect();
        prop_assert_eq!(after_queue, before_queue);
    }
}
