//! # feedsync core
//!
//! Data model and persisted store for the feedsync engine.
//!
//! This crate provides:
//! - Folders, feeds, articles, and pending mutations
//! - A journal-backed store with one atomic record per transaction
//! - Field-level merge of server state into local state
//! - A mutation queue with placeholder remapping and dependency ordering
//!
//! ## Key Invariants
//!
//! - Every write is a single transaction; a failed write changes nothing
//! - Readers see consistent snapshots and never block writers
//! - Mutations on the same target replay in creation order
//! - A mutation that references an unconfirmed placeholder is withheld
//! - The watermark never moves backwards

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod dir;
mod error;
mod journal;
mod merge;
pub mod model;
mod queue;
mod snapshot;
pub mod storage;
mod store;
mod tables;
mod txn;

pub use config::StoreConfig;
pub use dir::StoreDir;
pub use error::{StoreError, StoreResult};
pub use journal::{compute_crc32, JOURNAL_MAGIC, JOURNAL_VERSION};
pub use merge::{MergeReport, PullCursor, ServerSnapshot};
pub use model::{
    AccountId, Article, ArticleId, FailureDisposition, Feed, FeedId, Folder, FolderId,
    MutationFailure, MutationHandle, MutationKind, MutationOp, PendingMutation, ReadyMutation,
    RemapTable, TargetKey,
};
pub use snapshot::{Snapshot, StoreStats};
pub use store::Store;
