//! Pending mutation queue: ordering, confirmation, and failure handling.
//!
//! Mutations are stored exactly as enqueued. Placeholder references are
//! resolved through the remap table when a mutation is handed out, so a
//! restart between confirming a create and pushing its dependents loses
//! nothing.

use crate::error::{StoreError, StoreResult};
use crate::model::{
    unix_now, FailureDisposition, FeedId, FolderId, MutationFailure, MutationHandle, MutationOp,
    PendingMutation, ReadyMutation, TargetKey,
};
use crate::tables::Tables;
use crate::txn::WriteTxn;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Returns up to `limit` of the oldest mutations whose prerequisites are confirmed.
///
/// A mutation is withheld while any placeholder it depends on is unconfirmed,
/// and every later mutation on the same target is withheld with it.
pub(crate) fn next_mutations(tables: &Tables, limit: usize) -> Vec<ReadyMutation> {
    let mut ready = Vec::new();
    let mut blocked: BTreeSet<TargetKey> = BTreeSet::new();

    for pending in tables.mutations.values() {
        if ready.len() >= limit {
            break;
        }

        let op = pending.op.resolve(&tables.remap);
        let target = op.target();
        let unresolved = pending
            .op
            .dependencies()
            .iter()
            .any(|dep| !tables.remap.contains_key(dep));

        if unresolved || blocked.contains(&target) {
            blocked.insert(target);
            if let Some(created) = pending.op.creates() {
                blocked.insert(created_key(&pending.op, created));
            }
            continue;
        }

        ready.push(ReadyMutation {
            handle: pending.handle,
            op,
            attempts: pending.attempts,
        });
    }

    ready
}

fn created_key(op: &MutationOp, placeholder: i64) -> TargetKey {
    match op {
        MutationOp::CreateFeed { .. } => TargetKey::Feed(FeedId::new(placeholder)),
        _ => TargetKey::Folder(FolderId::new(placeholder)),
    }
}

/// Appends a mutation in creation order.
pub(crate) fn enqueue(txn: &mut WriteTxn, op: MutationOp) -> MutationHandle {
    let handle = txn.allocate_handle();
    debug!(handle = %handle, kind = %op.kind(), "mutation enqueued");
    txn.put_mutation(PendingMutation {
        handle,
        op,
        attempts: 0,
        created_at: unix_now(),
    });
    handle
}

fn take(txn: &mut WriteTxn, handle: MutationHandle) -> StoreResult<PendingMutation> {
    txn.remove_mutation(handle)
        .ok_or(StoreError::UnknownMutation(handle.get()))
}

/// Removes a confirmed mutation that created nothing.
pub(crate) fn confirm(txn: &mut WriteTxn, handle: MutationHandle) -> StoreResult<()> {
    let pending = txn
        .tables()
        .mutations
        .get(&handle)
        .ok_or(StoreError::UnknownMutation(handle.get()))?;
    if pending.op.creates().is_some() {
        return Err(StoreError::invalid(format!(
            "mutation {handle} creates an entity and needs a confirmed id"
        )));
    }
    take(txn, handle)?;
    prune_remap(txn);
    Ok(())
}

/// Confirms a create, re-keying the placeholder entity under `confirmed`.
pub(crate) fn confirm_created(
    txn: &mut WriteTxn,
    handle: MutationHandle,
    confirmed: i64,
) -> StoreResult<()> {
    if confirmed <= 0 {
        return Err(StoreError::invalid(format!(
            "confirmed id must be positive, got {confirmed}"
        )));
    }
    let pending = take(txn, handle)?;

    match &pending.op {
        MutationOp::CreateFolder { placeholder, .. } => {
            rekey_folder(txn, *placeholder, FolderId::new(confirmed));
        }
        MutationOp::CreateFeed { placeholder, .. } => {
            rekey_feed(txn, *placeholder, FeedId::new(confirmed));
        }
        _ => {
            return Err(StoreError::invalid(format!(
                "mutation {handle} ({}) does not create an entity",
                pending.op.kind()
            )));
        }
    }

    let placeholder = pending.op.creates().unwrap_or_default();
    txn.put_remap(placeholder, confirmed);
    prune_remap(txn);
    info!(handle = %handle, placeholder, confirmed, "create confirmed");
    Ok(())
}

fn rekey_folder(txn: &mut WriteTxn, placeholder: FolderId, confirmed: FolderId) {
    let Some(mut folder) = txn.remove_folder(placeholder) else {
        return;
    };
    folder.id = confirmed;
    txn.put_folder(folder);

    let children: Vec<_> = txn
        .tables()
        .feeds
        .values()
        .filter(|feed| feed.folder_id == Some(placeholder))
        .cloned()
        .collect();
    for mut feed in children {
        feed.folder_id = Some(confirmed);
        txn.put_feed(feed);
    }
}

fn rekey_feed(txn: &mut WriteTxn, placeholder: FeedId, confirmed: FeedId) {
    let Some(existing) = txn.tables().feeds.get(&placeholder).cloned() else {
        return;
    };
    let articles: Vec<_> = txn
        .tables()
        .articles
        .values()
        .filter(|a| a.feed_id == placeholder)
        .cloned()
        .collect();

    txn.remove_feed(placeholder);
    let mut feed = existing;
    feed.id = confirmed;
    txn.put_feed(feed);
    for mut article in articles {
        article.feed_id = confirmed;
        txn.put_article(article);
    }
    txn.refresh_unread(confirmed);
}

/// Drops remap entries no pending mutation references any more.
pub(crate) fn prune_remap(txn: &mut WriteTxn) {
    let unreferenced: Vec<i64> = txn
        .tables()
        .remap
        .keys()
        .filter(|placeholder| {
            !txn.tables()
                .mutations
                .values()
                .any(|m| m.op.references(**placeholder))
        })
        .copied()
        .collect();
    for placeholder in unreferenced {
        txn.remove_remap(placeholder);
    }
}

/// Records a failed push.
///
/// `Retry` keeps the mutation and counts the attempt. `Discard` removes it
/// and records a failure; a discarded create also discards everything that
/// depends on its placeholder and drops the placeholder entity.
pub(crate) fn fail(
    txn: &mut WriteTxn,
    handle: MutationHandle,
    disposition: FailureDisposition,
    reason: &str,
) -> StoreResult<()> {
    match disposition {
        FailureDisposition::Retry => {
            let mut pending = txn
                .tables()
                .mutations
                .get(&handle)
                .cloned()
                .ok_or(StoreError::UnknownMutation(handle.get()))?;
            pending.attempts += 1;
            debug!(
                handle = %handle,
                attempts = pending.attempts,
                reason,
                "mutation will be retried"
            );
            txn.put_mutation(pending);
        }
        FailureDisposition::Discard => {
            let pending = take(txn, handle)?;
            warn!(handle = %handle, kind = %pending.op.kind(), reason, "mutation discarded");
            record(txn, &pending, reason);

            let mut failed: Vec<i64> = pending.op.creates().into_iter().collect();
            while let Some(placeholder) = failed.pop() {
                drop_placeholder(txn, placeholder);
                let dependents: Vec<PendingMutation> = txn
                    .tables()
                    .mutations
                    .values()
                    .filter(|m| m.op.references(placeholder))
                    .cloned()
                    .collect();
                for dependent in dependents {
                    txn.remove_mutation(dependent.handle);
                    record(
                        txn,
                        &dependent,
                        &format!("depends on failed mutation {handle}"),
                    );
                    failed.extend(dependent.op.creates());
                }
            }
            prune_remap(txn);
        }
    }
    Ok(())
}

fn record(txn: &mut WriteTxn, pending: &PendingMutation, reason: &str) {
    txn.record_failure(MutationFailure {
        handle: pending.handle,
        kind: pending.op.kind(),
        reason: reason.to_string(),
        failed_at: unix_now(),
    });
}

/// Removes the local entity living under a discarded placeholder.
fn drop_placeholder(txn: &mut WriteTxn, placeholder: i64) {
    let folder = FolderId::new(placeholder);
    if txn.remove_folder(folder).is_some() {
        let children: Vec<_> = txn
            .tables()
            .feeds
            .values()
            .filter(|feed| feed.folder_id == Some(folder))
            .cloned()
            .collect();
        for mut feed in children {
            feed.folder_id = None;
            txn.put_feed(feed);
        }
    }
    txn.remove_feed(FeedId::new(placeholder));
}
