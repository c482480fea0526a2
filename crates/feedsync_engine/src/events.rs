//! Observable sync events.

use crate::error::SyncErrorKind;
use crate::state::SyncState;
use feedsync_core::MutationFailure;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::broadcast;

/// Capacity of the event channel; slow subscribers lose the oldest events.
pub const EVENT_CAPACITY: usize = 64;

/// What started a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncTrigger {
    /// The user asked for a sync.
    User,
    /// The periodic scheduler fired.
    Timer,
    /// The account configuration changed.
    ConfigurationChanged,
}

impl fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncTrigger::User => "user",
            SyncTrigger::Timer => "timer",
            SyncTrigger::ConfigurationChanged => "configuration-changed",
        })
    }
}

/// Counts reported at the end of a successful cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleSummary {
    /// Folders inserted, changed, or removed.
    pub folders_changed: usize,
    /// Feeds inserted, changed, or removed.
    pub feeds_changed: usize,
    /// New articles.
    pub articles_inserted: usize,
    /// Changed articles.
    pub articles_updated: usize,
    /// Articles dropped because their feed is unknown.
    pub articles_skipped: usize,
    /// Mutations the server accepted.
    pub mutations_confirmed: usize,
    /// Mutations discarded after a permanent failure.
    pub mutations_failed: usize,
    /// Pushing stopped early on a retryable failure.
    pub push_stalled: bool,
    /// Mutations still queued after the cycle.
    pub mutations_pending: usize,
    /// Failure records handed to the UI.
    pub failures: Vec<MutationFailure>,
    /// Watermark after the merge.
    pub watermark: u64,
    /// Wall time of the cycle.
    pub duration: Duration,
}

impl CycleSummary {
    /// Returns the number of articles inserted or updated.
    pub fn articles_merged(&self) -> usize {
        self.articles_inserted + self.articles_updated
    }
}

/// An event published by the synchronizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A cycle started.
    CycleStarted {
        /// What started it.
        trigger: SyncTrigger,
    },
    /// The state machine moved.
    StateChanged(SyncState),
    /// A cycle finished successfully.
    CycleFinished {
        /// What started it.
        trigger: SyncTrigger,
        /// What it did.
        summary: CycleSummary,
    },
    /// A cycle failed.
    Error {
        /// What started it.
        trigger: SyncTrigger,
        /// Error classification.
        kind: SyncErrorKind,
        /// Human-readable message.
        message: String,
    },
}

/// Broadcast channel for [`SyncEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    /// Creates a bus holding up to [`EVENT_CAPACITY`] undelivered events per subscriber.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    /// Subscribes to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// Publishes an event. Events without subscribers are dropped.
    pub fn publish(&self, event: SyncEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribers_see_later_events() {
        let bus = EventBus::new();
        bus.publish(SyncEvent::StateChanged(SyncState::Pulling));

        let mut rx = bus.subscribe();
        bus.publish(SyncEvent::CycleStarted {
            trigger: SyncTrigger::User,
        });
        assert_eq!(
            rx.try_recv().unwrap(),
            SyncEvent::CycleStarted {
                trigger: SyncTrigger::User
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn summary_counts() {
        let summary = CycleSummary {
            articles_inserted: 3,
            articles_updated: 2,
            ..CycleSummary::default()
        };
        assert_eq!(summary.articles_merged(), 5);
        assert_eq!(SyncTrigger::ConfigurationChanged.to_string(), "configuration-changed");
    }
}
