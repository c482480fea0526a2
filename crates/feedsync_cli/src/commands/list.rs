//! Listing commands.

use crate::context::DataDir;
use crate::error::CliResult;
use crate::output::{clip, emit, Format};
use feedsync_core::{Article, Feed, FeedId, Folder};
use std::path::Path;

/// Article selection of the `articles` command.
#[derive(Debug, Clone, Default)]
pub struct ArticleFilter {
    pub feed: Option<i64>,
    pub unread: bool,
    pub starred: bool,
    pub limit: usize,
}

impl ArticleFilter {
    fn matches(&self, article: &Article) -> bool {
        self.feed.map_or(true, |feed| article.feed_id == FeedId::new(feed))
            && (!self.unread || !article.read)
            && (!self.starred || article.starred)
    }

    /// Selects matching articles, newest first.
    pub fn apply<'a>(&self, articles: impl Iterator<Item = &'a Article>) -> Vec<Article> {
        let mut selected: Vec<Article> = articles.filter(|a| self.matches(a)).cloned().collect();
        selected.sort_by(|a, b| {
            b.published_at
                .cmp(&a.published_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        selected.truncate(self.limit);
        selected
    }
}

/// Lists folders.
pub fn folders(dir: &Path, format: Format) -> CliResult<()> {
    let (_, store) = DataDir::new(dir).open_store()?;
    let snapshot = store.snapshot();
    let folders: Vec<Folder> = snapshot.folders().cloned().collect();

    emit(format, &folders, |folders| {
        for folder in folders {
            let feeds = snapshot.feeds_in(Some(folder.id)).count();
            println!("{:>8}  {}  ({feeds} feeds)", folder.id.get(), folder.name);
        }
    })?;
    Ok(())
}

/// Lists feeds.
pub fn feeds(dir: &Path, format: Format) -> CliResult<()> {
    let (_, store) = DataDir::new(dir).open_store()?;
    let feeds: Vec<Feed> = store.snapshot().feeds().cloned().collect();

    emit(format, &feeds, |feeds| {
        for feed in feeds {
            let folder = feed
                .folder_id
                .map_or_else(|| "-".to_string(), |id| id.to_string());
            println!(
                "{:>8}  {:>6}  {:>5}  {}",
                feed.id.get(),
                folder,
                feed.unread_count,
                clip(&feed.title, 60)
            );
        }
    })?;
    Ok(())
}

/// Lists articles matching `filter`.
pub fn articles(dir: &Path, filter: &ArticleFilter, format: Format) -> CliResult<()> {
    let (_, store) = DataDir::new(dir).open_store()?;
    let articles = filter.apply(store.snapshot().articles());

    emit(format, &articles, |articles| {
        for article in articles {
            let flags = format!(
                "{}{}",
                if article.read { ' ' } else { '*' },
                if article.starred { '★' } else { ' ' }
            );
            println!(
                "{:>10}  {flags}  {:>6}  {}",
                article.id.get(),
                article.feed_id.get(),
                clip(&article.title, 70)
            );
        }
    })?;
    Ok(())
}
