//! Mutation queue commands.

use crate::context::DataDir;
use crate::error::CliResult;
use crate::output::{emit, Format};
use feedsync_core::{MutationFailure, PendingMutation, TargetKey};
use std::path::Path;

fn target(key: TargetKey) -> String {
    match key {
        TargetKey::Article(id) => format!("article {id}"),
        TargetKey::Folder(id) => format!("folder {id}"),
        TargetKey::Feed(id) => format!("feed {id}"),
    }
}

/// Lists mutations waiting to be pushed.
pub fn pending(dir: &Path, format: Format) -> CliResult<()> {
    let (_, store) = DataDir::new(dir).open_store()?;
    let pending: Vec<PendingMutation> = store.snapshot().pending_mutations().cloned().collect();

    emit(format, &pending, |pending| {
        if pending.is_empty() {
            println!("Nothing to push");
        }
        for mutation in pending {
            let retries = if mutation.attempts > 0 {
                format!("  ({} failed attempts)", mutation.attempts)
            } else {
                String::new()
            };
            println!(
                "{:>6}  {:<14} {}{retries}",
                mutation.handle.to_string(),
                mutation.op.kind().to_string(),
                target(mutation.op.target())
            );
        }
    })?;
    Ok(())
}

/// Lists mutations the server rejected, optionally clearing them.
pub fn failures(dir: &Path, clear: bool, format: Format) -> CliResult<()> {
    let (_, store) = DataDir::new(dir).open_store()?;
    let failures: Vec<MutationFailure> = if clear {
        store.take_failures()?
    } else {
        store.snapshot().failures().to_vec()
    };

    emit(format, &failures, |failures| {
        if failures.is_empty() {
            println!("No rejected changes");
        }
        for failure in failures {
            println!(
                "{:>6}  {:<14} {}",
                failure.handle.to_string(),
                failure.kind.to_string(),
                failure.reason
            );
        }
    })?;
    Ok(())
}
