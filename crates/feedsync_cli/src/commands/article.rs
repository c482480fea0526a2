//! Article flag commands.

use super::Change;
use crate::context::DataDir;
use crate::error::CliResult;
use crate::output::Format;
use feedsync_core::ArticleId;
use std::path::Path;

/// Flag to set on an article.
#[derive(Debug, Clone, Copy)]
pub enum Flag {
    /// Read or unread.
    Read(bool),
    /// Starred or unstarred.
    Starred(bool),
}

impl Flag {
    fn verb(self) -> &'static str {
        match self {
            Flag::Read(true) => "read",
            Flag::Read(false) => "unread",
            Flag::Starred(true) => "star",
            Flag::Starred(false) => "unstar",
        }
    }
}

/// Sets `flag` on an article and queues the change.
pub fn run(dir: &Path, article: i64, flag: Flag, format: Format) -> CliResult<()> {
    let (_, store) = DataDir::new(dir).open_store()?;
    let id = ArticleId::new(article);
    let queued = match flag {
        Flag::Read(read) => store.mark_article_read(id, read)?,
        Flag::Starred(starred) => store.star_article(id, starred)?,
    };
    Change::new(format!("{} article {article}", flag.verb()), queued).print(format)
}
