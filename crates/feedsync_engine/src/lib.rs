//! # feedsync Engine
//!
//! Account validation and the sync cycle for feedsync.
//!
//! This crate provides:
//! - Account configuration with a single owner ([`AccountHandle`])
//! - The account validator (reachability, credentials, server version)
//! - The sync state machine (idle → validating → pushing → pulling → merging)
//! - Mutation replay with placeholder remapping and failure handling
//! - Retry with exponential backoff and a periodic scheduler
//! - An observable event stream
//!
//! ## Architecture
//!
//! The engine uses a **push-then-pull** model:
//! 1. Replay queued local mutations, one at a time, oldest first
//! 2. Fetch folders, feeds, and items changed since the watermark
//! 3. Merge everything into the store in one atomic transaction
//!
//! ## Key Invariants
//!
//! - No push or pull against an account that failed validation
//! - At most one cycle per account at a time; extra triggers are coalesced
//! - A failed pull leaves the store untouched
//! - The state always returns to idle

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod account;
mod config;
mod error;
mod events;
mod scheduler;
mod state;
mod synchronizer;
mod validator;

pub use account::{AccountConfig, AccountHandle};
pub use config::{RetryConfig, SyncConfig};
pub use error::{SyncError, SyncErrorKind, SyncResult};
pub use events::{CycleSummary, EventBus, SyncEvent, SyncTrigger, EVENT_CAPACITY};
pub use scheduler::PeriodicSync;
pub use state::{StateEvent, SyncState};
pub use synchronizer::{SyncOutcome, SyncStats, Synchronizer};
pub use validator::{AccountValidator, Validation};
