//! Sync cycle state machine.
//!
//! [`SyncState::next`] is a pure transition function; the synchronizer
//! feeds it [`StateEvent`]s as a cycle progresses.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The current phase of the synchronizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncState {
    /// No cycle running.
    Idle,
    /// Probing the account.
    Validating,
    /// Replaying queued mutations.
    PushingMutations,
    /// Fetching folders, feeds, and items.
    Pulling,
    /// Folding the fetched state into the store.
    Merging,
    /// The cycle failed; always followed by [`SyncState::Idle`].
    Error,
}

/// Something that moves a cycle forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEvent {
    /// A user, timer, or configuration change requested a cycle.
    Triggered,
    /// The account is valid.
    Validated,
    /// Pushing is finished or stalled.
    Pushed,
    /// Everything is fetched.
    Pulled,
    /// The merge committed.
    Merged,
    /// The current phase failed or the cycle was cancelled.
    Failed,
    /// The failure has been reported.
    Reset,
}

impl SyncState {
    /// Returns the state after `event`, or `None` if `event` is not valid here.
    pub fn next(self, event: StateEvent) -> Option<SyncState> {
        use StateEvent as E;
        use SyncState as S;

        match (self, event) {
            (S::Idle, E::Triggered) => Some(S::Validating),
            (S::Validating, E::Validated) => Some(S::PushingMutations),
            (S::PushingMutations, E::Pushed) => Some(S::Pulling),
            (S::Pulling, E::Pulled) => Some(S::Merging),
            (S::Merging, E::Merged) => Some(S::Idle),
            (S::Validating | S::PushingMutations | S::Pulling | S::Merging, E::Failed) => {
                Some(S::Error)
            }
            (S::Error, E::Reset) => Some(S::Idle),
            _ => None,
        }
    }

    /// Returns true while a cycle is running.
    pub fn is_active(self) -> bool {
        !matches!(self, SyncState::Idle | SyncState::Error)
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncState::Idle => "idle",
            SyncState::Validating => "validating",
            SyncState::PushingMutations => "pushing-mutations",
            SyncState::Pulling => "pulling",
            SyncState::Merging => "merging",
            SyncState::Error => "error",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path() {
        let events = [
            StateEvent::Triggered,
            StateEvent::Validated,
            StateEvent::Pushed,
            StateEvent::Pulled,
            StateEvent::Merged,
        ];
        let mut state = SyncState::Idle;
        let mut seen = vec![state];
        for event in events {
            state = state.next(event).unwrap();
            seen.push(state);
        }
        assert_eq!(
            seen,
            vec![
                SyncState::Idle,
                SyncState::Validating,
                SyncState::PushingMutations,
                SyncState::Pulling,
                SyncState::Merging,
                SyncState::Idle,
            ]
        );
    }

    #[test]
    fn every_active_state_can_fail_back_to_idle() {
        for state in [
            SyncState::Validating,
            SyncState::PushingMutations,
            SyncState::Pulling,
            SyncState::Merging,
        ] {
            assert!(state.is_active());
            let failed = state.next(StateEvent::Failed).unwrap();
            assert_eq!(failed, SyncState::Error);
            assert_eq!(failed.next(StateEvent::Reset), Some(SyncState::Idle));
        }
    }

    #[test]
    fn phases_cannot_be_skipped() {
        assert_eq!(SyncState::Idle.next(StateEvent::Pulled), None);
        assert_eq!(SyncState::Validating.next(StateEvent::Pulled), None);
        assert_eq!(SyncState::Pulling.next(StateEvent::Merged), None);
        assert_eq!(SyncState::Idle.next(StateEvent::Failed), None);
        assert_eq!(SyncState::Error.next(StateEvent::Triggered), None);
    }
}
