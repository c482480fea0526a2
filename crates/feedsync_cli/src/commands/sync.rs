//! Sync commands.

use crate::context::DataDir;
use crate::error::CliResult;
use crate::output::{emit, Format};
use feedsync_engine::{
    CycleSummary, PeriodicSync, SyncConfig, SyncEvent, SyncOutcome, SyncTrigger,
};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

fn print_summary(summary: &CycleSummary, format: Format) -> CliResult<()> {
    emit(format, summary, |s| {
        println!(
            "Synced in {:.1}s: {} new, {} updated articles; {} folder and {} feed changes",
            s.duration.as_secs_f64(),
            s.articles_inserted,
            s.articles_updated,
            s.folders_changed,
            s.feeds_changed,
        );
        println!(
            "Pushed {} change(s), {} rejected, {} still pending{}",
            s.mutations_confirmed,
            s.mutations_failed,
            s.mutations_pending,
            if s.push_stalled { " (server busy, will retry)" } else { "" },
        );
        if s.articles_skipped > 0 {
            println!("Skipped {} article(s) of unknown feeds", s.articles_skipped);
        }
        for failure in &s.failures {
            println!("  rejected {} {}: {}", failure.handle, failure.kind, failure.reason);
        }
    })?;
    Ok(())
}

/// Runs one cycle.
pub fn run(dir: &Path, format: Format) -> CliResult<()> {
    let data = DataDir::new(dir);
    let sync = data.synchronizer(SyncConfig::new())?;
    let outcome = sync.sync(SyncTrigger::User);
    data.save_from(&sync)?;

    match outcome? {
        SyncOutcome::Completed(summary) => print_summary(&summary, format),
        SyncOutcome::Coalesced => {
            println!("A sync is already running");
            Ok(())
        }
    }
}

/// Syncs every `interval` seconds until interrupted.
pub fn watch(dir: &Path, interval: u64, format: Format) -> CliResult<()> {
    let data = DataDir::new(dir);
    let config = SyncConfig::new().with_sync_interval(Duration::from_secs(interval.max(1)));
    let sync = Arc::new(data.synchronizer(config)?);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let mut events = sync.subscribe();
        let periodic = PeriodicSync::spawn(Arc::clone(&sync));

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    sync.cancel();
                    break;
                }
                event = events.recv() => match event {
                    Ok(SyncEvent::CycleFinished { summary, .. }) => {
                        print_summary(&summary, format)?;
                        data.save_from(&sync)?;
                    }
                    Ok(SyncEvent::Error { trigger, kind, message }) => match format {
                        Format::Json => println!(
                            "{}",
                            json!({ "trigger": trigger, "error": kind, "message": message })
                        ),
                        Format::Text => println!("Sync failed ({kind}): {message}"),
                    },
                    Ok(_) => {}
                    Err(RecvError::Lagged(missed)) => warn!(missed, "event stream lagged"),
                    Err(RecvError::Closed) => break,
                },
            }
        }

        periodic.shutdown().await;
        CliResult::Ok(())
    })?;

    data.save_from(&sync)
}
