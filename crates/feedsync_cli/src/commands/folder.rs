//! Folder commands.

use super::Change;
use crate::context::DataDir;
use crate::error::CliResult;
use crate::output::Format;
use feedsync_core::FolderId;
use std::path::Path;

/// Creates a folder.
pub fn add(dir: &Path, name: &str, format: Format) -> CliResult<()> {
    let (_, store) = DataDir::new(dir).open_store()?;
    let (id, queued) = store.create_folder(name)?;
    Change::created(format!("add folder {name:?}"), id.get(), queued).print(format)
}

/// Renames a folder.
pub fn rename(dir: &Path, folder: i64, name: &str, format: Format) -> CliResult<()> {
    let (_, store) = DataDir::new(dir).open_store()?;
    let queued = store.rename_folder(FolderId::new(folder), name)?;
    Change::new(format!("rename folder {folder} to {name:?}"), queued).print(format)
}

/// Deletes a folder together with its feeds.
pub fn remove(dir: &Path, folder: i64, format: Format) -> CliResult<()> {
    let (_, store) = DataDir::new(dir).open_store()?;
    let queued = store.delete_folder(FolderId::new(folder))?;
    Change::new(format!("remove folder {folder}"), Some(queued)).print(format)
}
