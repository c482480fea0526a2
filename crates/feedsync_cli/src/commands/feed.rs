//! Feed commands.

use super::Change;
use crate::context::DataDir;
use crate::error::CliResult;
use crate::output::Format;
use feedsync_core::{FeedId, FolderId};
use std::path::Path;

/// Subscribes to `url`, optionally inside a folder.
pub fn add(dir: &Path, url: &str, folder: Option<i64>, format: Format) -> CliResult<()> {
    let (_, store) = DataDir::new(dir).open_store()?;
    let (id, queued) = store.create_feed(url, folder.map(FolderId::new))?;
    Change::created(format!("add feed {url}"), id.get(), queued).print(format)
}

/// Moves a feed into `folder`, or to the top level.
pub fn move_to(dir: &Path, feed: i64, folder: Option<i64>, format: Format) -> CliResult<()> {
    let (_, store) = DataDir::new(dir).open_store()?;
    let queued = store.move_feed(FeedId::new(feed), folder.map(FolderId::new))?;
    let target = folder.map_or_else(|| "top level".to_string(), |f| format!("folder {f}"));
    Change::new(format!("move feed {feed} to {target}"), queued).print(format)
}

/// Renames a feed.
pub fn rename(dir: &Path, feed: i64, title: &str, format: Format) -> CliResult<()> {
    let (_, store) = DataDir::new(dir).open_store()?;
    let queued = store.rename_feed(FeedId::new(feed), title)?;
    Change::new(format!("rename feed {feed} to {title:?}"), queued).print(format)
}

/// Unsubscribes from a feed.
pub fn remove(dir: &Path, feed: i64, format: Format) -> CliResult<()> {
    let (_, store) = DataDir::new(dir).open_store()?;
    let queued = store.delete_feed(FeedId::new(feed))?;
    Change::new(format!("remove feed {feed}"), Some(queued)).print(format)
}

/// Marks every article of a feed read.
pub fn mark_read(dir: &Path, feed: i64, format: Format) -> CliResult<()> {
    let (_, store) = DataDir::new(dir).open_store()?;
    let queued = store.mark_feed_read(FeedId::new(feed))?;
    Change::new(format!("mark feed {feed} read"), queued).print(format)
}
