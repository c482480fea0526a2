//! feedsync CLI
//!
//! Command-line client for a Nextcloud News account.
//!
//! # Commands
//!
//! - `account set|show` - Configure the account
//! - `validate` - Check the account against the server
//! - `sync` - Run one sync cycle
//! - `watch` - Sync periodically until interrupted
//! - `folders`, `feeds`, `articles` - List the local store
//! - `read`, `unread`, `star`, `unstar` - Change article flags offline
//! - `folder`, `feed` - Manage folders and subscriptions offline
//! - `pending`, `failures` - Show the mutation queue
//! - `inspect` - Display store statistics

mod commands;
mod context;
mod error;
mod http;
mod output;

use clap::{Parser, Subcommand};
use output::Format;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Offline-first Nextcloud News client.
#[derive(Parser)]
#[command(name = "feedsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the account file and local stores
    #[arg(global = true, short, long, env = "FEEDSYNC_DATA_DIR", default_value = ".feedsync")]
    data_dir: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Output format
    #[arg(global = true, short, long, value_enum, default_value_t = Format::Text)]
    format: Format,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the account
    #[command(subcommand)]
    Account(AccountCommand),

    /// Check the configured account against the server
    Validate,

    /// Run one sync cycle
    Sync,

    /// Sync periodically until interrupted
    Watch {
        /// Seconds between cycles
        #[arg(short, long, default_value = "900")]
        interval: u64,
    },

    /// List folders
    Folders,

    /// List feeds
    Feeds,

    /// List articles, newest first
    Articles {
        /// Only articles of this feed
        #[arg(long)]
        feed: Option<i64>,

        /// Only unread articles
        #[arg(long)]
        unread: bool,

        /// Only starred articles
        #[arg(long)]
        starred: bool,

        /// Maximum number of articles
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Mark an article read
    Read {
        /// Article id
        article: i64,
    },

    /// Mark an article unread
    Unread {
        /// Article id
        article: i64,
    },

    /// Star an article
    Star {
        /// Article id
        article: i64,
    },

    /// Unstar an article
    Unstar {
        /// Article id
        article: i64,
    },

    /// Manage folders
    #[command(subcommand)]
    Folder(FolderCommand),

    /// Manage feeds
    #[command(subcommand)]
    Feed(FeedCommand),

    /// List queued mutations
    Pending,

    /// List mutations the server rejected
    Failures {
        /// Clear the list after printing
        #[arg(long)]
        clear: bool,
    },

    /// Display store statistics
    Inspect,
}

#[derive(Subcommand)]
enum AccountCommand {
    /// Store server and credentials, validating them first
    Set {
        /// Server base URL
        #[arg(long, env = "FEEDSYNC_SERVER")]
        server: String,

        /// User name
        #[arg(long, env = "FEEDSYNC_USER")]
        user: String,

        /// Password or app password
        #[arg(long, env = "FEEDSYNC_PASSWORD", hide_env_values = true)]
        password: String,

        /// Save without contacting the server
        #[arg(long)]
        no_validate: bool,
    },

    /// Show the configured account
    Show,
}

#[derive(Subcommand)]
enum FolderCommand {
    /// Create a folder
    Add {
        /// Folder name
        name: String,
    },
    /// Rename a folder
    Rename {
        /// Folder id
        folder: i64,
        /// New name
        name: String,
    },
    /// Delete a folder and its feeds
    Remove {
        /// Folder id
        folder: i64,
    },
}

#[derive(Subcommand)]
enum FeedCommand {
    /// Subscribe to a feed
    Add {
        /// Feed URL
        url: String,
        /// Target folder id
        #[arg(long)]
        folder: Option<i64>,
    },
    /// Move a feed to another folder, or out of any folder
    Move {
        /// Feed id
        feed: i64,
        /// Target folder id
        #[arg(long)]
        folder: Option<i64>,
    },
    /// Rename a feed
    Rename {
        /// Feed id
        feed: i64,
        /// New title
        title: String,
    },
    /// Unsubscribe from a feed
    Remove {
        /// Feed id
        feed: i64,
    },
    /// Mark every article of a feed read
    Read {
        /// Feed id
        feed: i64,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let dir = cli.data_dir.as_path();
    let format = cli.format;

    match cli.command {
        Commands::Account(AccountCommand::Set {
            server,
            user,
            password,
            no_validate,
        }) => commands::account::set(dir, &server, &user, &password, !no_validate, format)?,
        Commands::Account(AccountCommand::Show) => commands::account::show(dir, format)?,
        Commands::Validate => commands::account::validate(dir, format)?,
        Commands::Sync => commands::sync::run(dir, format)?,
        Commands::Watch { interval } => commands::sync::watch(dir, interval, format)?,
        Commands::Folders => commands::list::folders(dir, format)?,
        Commands::Feeds => commands::list::feeds(dir, format)?,
        Commands::Articles {
            feed,
            unread,
            starred,
            limit,
        } => {
            let filter = commands::list::ArticleFilter {
                feed,
                unread,
                starred,
                limit,
            };
            commands::list::articles(dir, &filter, format)?;
        }
        Commands::Read { article } => {
            commands::article::run(dir, article, commands::article::Flag::Read(true), format)?;
        }
        Commands::Unread { article } => {
            commands::article::run(dir, article, commands::article::Flag::Read(false), format)?;
        }
        Commands::Star { article } => {
            commands::article::run(dir, article, commands::article::Flag::Starred(true), format)?;
        }
        Commands::Unstar { article } => {
            commands::article::run(dir, article, commands::article::Flag::Starred(false), format)?;
        }
        Commands::Folder(FolderCommand::Add { name }) => {
            commands::folder::add(dir, &name, format)?;
        }
        Commands::Folder(FolderCommand::Rename { folder, name }) => {
            commands::folder::rename(dir, folder, &name, format)?;
        }
        Commands::Folder(FolderCommand::Remove { folder }) => {
            commands::folder::remove(dir, folder, format)?;
        }
        Commands::Feed(FeedCommand::Add { url, folder }) => {
            commands::feed::add(dir, &url, folder, format)?;
        }
        Commands::Feed(FeedCommand::Move { feed, folder }) => {
            commands::feed::move_to(dir, feed, folder, format)?;
        }
        Commands::Feed(FeedCommand::Rename { feed, title }) => {
            commands::feed::rename(dir, feed, &title, format)?;
        }
        Commands::Feed(FeedCommand::Remove { feed }) => {
            commands::feed::remove(dir, feed, format)?;
        }
        Commands::Feed(FeedCommand::Read { feed }) => {
            commands::feed::mark_read(dir, feed, format)?;
        }
        Commands::Pending => commands::queue::pending(dir, format)?,
        Commands::Failures { clear } => commands::queue::failures(dir, clear, format)?,
        Commands::Inspect => commands::inspect::run(dir, format)?,
    }

    Ok(())
}
