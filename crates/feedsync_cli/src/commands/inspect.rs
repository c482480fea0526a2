//! Inspect command implementation.

use crate::context::DataDir;
use crate::error::CliResult;
use crate::output::{emit, Format};
use feedsync_core::StoreStats;
use serde::Serialize;
use std::path::Path;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Directory of the account's store.
    pub path: String,
    /// Local store id.
    pub account_id: String,
    /// Server base URL.
    pub server_url: String,
    /// Row counts and journal size.
    #[serde(flatten)]
    pub stats: StoreStats,
}

/// Runs the inspect command.
pub fn run(dir: &Path, format: Format) -> CliResult<()> {
    let data = DataDir::new(dir);
    let (account, store) = data.open_store()?;
    let account_id = account.account_id();

    let result = InspectResult {
        path: data
            .stores_path()
            .join(account_id.as_str())
            .display()
            .to_string(),
        account_id: account_id.to_string(),
        server_url: account.server_url.clone(),
        stats: store.stats(),
    };

    emit(format, &result, |r| {
        println!("Store:        {}", r.path);
        println!("Account:      {} ({})", r.server_url, r.account_id);
        println!("Folders:      {}", r.stats.folders);
        println!("Feeds:        {}", r.stats.feeds);
        println!(
            "Articles:     {} ({} unread, {} starred)",
            r.stats.articles, r.stats.unread, r.stats.starred
        );
        println!("Pending:      {}", r.stats.pending_mutations);
        println!("Failures:     {}", r.stats.failures);
        println!("Placeholders: {}", r.stats.placeholders);
        println!("Watermark:    {}", r.stats.watermark);
        println!("Journal:      {} bytes", r.stats.journal_bytes);
    })?;
    Ok(())
}
