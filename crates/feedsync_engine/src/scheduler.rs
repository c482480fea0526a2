//! Periodic sync scheduling.
//!
//! [`PeriodicSync`] runs timer-triggered cycles on the tokio runtime. Cycles
//! themselves are blocking and run on the blocking pool. After a failed
//! cycle the next one is delayed by the retry backoff; a successful cycle
//! restores the regular interval.

use crate::events::SyncTrigger;
use crate::synchronizer::{next_delay, SyncOutcome, Synchronizer};
use feedsync_api::HttpClient;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A running periodic sync task.
#[derive(Debug)]
pub struct PeriodicSync {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PeriodicSync {
    /// Spawns the scheduler on the current tokio runtime.
    ///
    /// The first cycle starts immediately; later cycles follow the
    /// synchronizer's configured interval and backoff.
    pub fn spawn<C>(sync: Arc<Synchronizer<C>>) -> Self
    where
        C: HttpClient + 'static,
    {
        let (shutdown, mut stop) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut failures = 0u32;
            let mut delay = std::time::Duration::ZERO;

            loop {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = stop.changed() => break,
                }

                let cycle = Arc::clone(&sync);
                let result =
                    tokio::task::spawn_blocking(move || cycle.sync(SyncTrigger::Timer)).await;

                match result {
                    Ok(Ok(SyncOutcome::Completed(_))) => failures = 0,
                    Ok(Ok(SyncOutcome::Coalesced)) => {}
                    Ok(Err(err)) => {
                        failures = failures.saturating_add(1);
                        debug!(failures, error = %err, "scheduled cycle failed");
                    }
                    Err(join) => {
                        failures = failures.saturating_add(1);
                        warn!(error = %join, "scheduled cycle panicked");
                    }
                }

                delay = next_delay(sync.config(), failures);
                debug!(delay_ms = delay.as_millis() as u64, failures, "next scheduled cycle");
            }

            info!("periodic sync stopped");
        });

        Self { shutdown, task }
    }

    /// Stops the scheduler and waits for a running cycle to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.task.await {
            warn!(error = %err, "periodic sync task ended abnormally");
        }
    }
}
