//! CLI command implementations.

pub mod account;
pub mod article;
pub mod feed;
pub mod folder;
pub mod inspect;
pub mod list;
pub mod queue;
pub mod sync;

use crate::error::CliResult;
use crate::output::{emit, Format};
use feedsync_core::MutationHandle;
use serde::Serialize;

/// Outcome of a local change.
#[derive(Debug, Serialize)]
pub struct Change {
    /// What was changed, e.g. `star article 42`.
    pub action: String,
    /// Id of a newly created entity. Negative until the next sync confirms it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Queued mutation, or `None` if nothing changed.
    pub queued: Option<MutationHandle>,
}

impl Change {
    pub fn new(action: impl Into<String>, queued: Option<MutationHandle>) -> Self {
        Self {
            action: action.into(),
            id: None,
            queued,
        }
    }

    pub fn created(action: impl Into<String>, id: i64, queued: MutationHandle) -> Self {
        Self {
            action: action.into(),
            id: Some(id),
            queued: Some(queued),
        }
    }

    pub fn print(&self, format: Format) -> CliResult<()> {
        emit(format, self, |change| {
            let id = change.id.map(|id| format!(" (id {id})")).unwrap_or_default();
            match change.queued {
                Some(handle) => println!("{}{id}: queued as {handle}", change.action),
                None => println!("{}: already in that state", change.action),
            }
        })?;
        Ok(())
    }
}
