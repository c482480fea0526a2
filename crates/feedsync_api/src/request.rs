//! API request objects.
//!
//! One [`ApiRequest`] variant per remote operation. Each variant knows how to
//! validate its typed parameters, build its HTTP request, and parse its
//! typed [`ApiResponse`]. Paginated item fetching is driven by the client.

use crate::error::{ApiError, ApiResult};
use crate::version::{Capabilities, Capability, ServerVersion};
use crate::wire::{
    FeedsEnvelope, FoldersEnvelope, ItemsEnvelope, StatusEnvelope, VersionEnvelope,
};
use feedsync_core::{Article, ArticleId, Feed, FeedId, Folder, FolderId, MutationOp};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::fmt;

use crate::http::Method;

/// Parameters of an incremental item fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchItems {
    /// Only items with a marker above this are requested.
    pub since: u64,
    /// Items per page.
    pub batch_size: u32,
    /// Stop after this many items.
    pub max_items: Option<usize>,
    /// Only items with an id below this are requested; 0 starts at the newest.
    pub offset: i64,
}

impl FetchItems {
    /// Fetches everything changed since `since` in pages of 200.
    #[must_use]
    pub fn since(since: u64) -> Self {
        Self {
            since,
            batch_size: 200,
            max_items: None,
            offset: 0,
        }
    }

    /// Sets the page size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Caps the total number of items.
    #[must_use]
    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = Some(max_items);
        self
    }

    /// Continues an earlier capped fetch from `offset`.
    #[must_use]
    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// An item addressed by feed and guid hash, for the star endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StarTarget {
    /// Item id.
    pub article: ArticleId,
    /// Feed of the item.
    pub feed: FeedId,
    /// Guid hash of the item.
    pub guid_hash: String,
}

/// One remote operation with its typed parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiRequest {
    /// Server version (reachability and authentication probe).
    Version,
    /// Server status and warnings.
    Status,
    /// All folders.
    FetchFolders,
    /// All feeds.
    FetchFeeds,
    /// Items changed since a marker, paginated.
    FetchItems(FetchItems),
    /// Create a folder.
    CreateFolder {
        /// Folder name.
        name: String,
    },
    /// Rename a folder.
    RenameFolder {
        /// Folder id.
        folder: FolderId,
        /// New name.
        name: String,
    },
    /// Delete a folder.
    DeleteFolder {
        /// Folder id.
        folder: FolderId,
    },
    /// Subscribe to a feed.
    CreateFeed {
        /// Feed URL.
        url: String,
        /// Parent folder.
        folder: Option<FolderId>,
    },
    /// Move a feed.
    MoveFeed {
        /// Feed id.
        feed: FeedId,
        /// New parent folder.
        folder: Option<FolderId>,
    },
    /// Rename a feed.
    RenameFeed {
        /// Feed id.
        feed: FeedId,
        /// New title.
        title: String,
    },
    /// Unsubscribe from a feed.
    DeleteFeed {
        /// Feed id.
        feed: FeedId,
    },
    /// Mark all items of a feed up to `newest` read.
    MarkFeedRead {
        /// Feed id.
        feed: FeedId,
        /// Newest item id to mark.
        newest: ArticleId,
    },
    /// Mark items read or unread.
    MarkItems {
        /// Item ids.
        items: Vec<ArticleId>,
        /// Target state.
        read: bool,
    },
    /// Star or unstar items.
    StarItems {
        /// Items.
        items: Vec<StarTarget>,
        /// Target state.
        starred: bool,
        /// Address items by id instead of feed and guid hash.
        by_id: bool,
    },
}

/// Server status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerStatus {
    /// Server version.
    pub version: ServerVersion,
    /// Background update job misconfigured.
    pub cron_warning: bool,
    /// Database charset problem.
    pub db_charset_warning: bool,
}

/// Result of fetching all feeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedList {
    /// Feeds.
    pub feeds: Vec<Feed>,
    /// Number of starred items on the server.
    pub starred_count: Option<u32>,
    /// Highest item id on the server.
    pub newest_item: Option<ArticleId>,
}

/// Items merged from every fetched page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemBatch {
    /// Articles, deduplicated by id.
    pub articles: Vec<Article>,
    /// Highest marker among the articles.
    pub max_marker: u64,
    /// Number of pages requested, including the final empty one.
    pub pages: u32,
    /// Offset to continue from when the item cap ended the fetch early.
    pub resume_offset: Option<i64>,
}

/// Typed result of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiResponse {
    /// Result of [`ApiRequest::Version`].
    Version(ServerVersion),
    /// Result of [`ApiRequest::Status`].
    Status(ServerStatus),
    /// Result of [`ApiRequest::FetchFolders`].
    Folders(Vec<Folder>),
    /// Result of [`ApiRequest::FetchFeeds`].
    Feeds(FeedList),
    /// Result of [`ApiRequest::FetchItems`].
    Items(ItemBatch),
    /// Result of [`ApiRequest::CreateFolder`].
    FolderCreated(Folder),
    /// Result of [`ApiRequest::CreateFeed`].
    FeedCreated(Feed),
    /// Any request without a payload succeeded.
    Done,
}

/// Method, path relative to the API root, and JSON body of a single call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// HTTP method.
    pub method: Method,
    /// Path relative to the API root, with query string.
    pub path: String,
    /// JSON body.
    pub body: Option<String>,
}

impl Endpoint {
    fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
        }
    }

    fn with_body(method: Method, path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method,
            path: path.into(),
            body: Some(body.to_string()),
        }
    }

    fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::Delete,
            path: path.into(),
            body: None,
        }
    }
}

impl ApiRequest {
    /// Builds the request that pushes a queued mutation.
    ///
    /// Star requests address items by id when the server supports it.
    #[must_use]
    pub fn for_mutation(op: &MutationOp, capabilities: &Capabilities) -> Self {
        match op {
            MutationOp::MarkRead { article, read } => ApiRequest::MarkItems {
                items: vec![*article],
                read: *read,
            },
            MutationOp::Star {
                article,
                feed,
                guid_hash,
                starred,
            } => ApiRequest::StarItems {
                items: vec![StarTarget {
                    article: *article,
                    feed: *feed,
                    guid_hash: guid_hash.clone(),
                }],
                starred: *starred,
                by_id: capabilities.supports(Capability::StarByItemIds),
            },
            MutationOp::CreateFolder { name, .. } => ApiRequest::CreateFolder { name: name.clone() },
            MutationOp::RenameFolder { folder, name } => ApiRequest::RenameFolder {
                folder: *folder,
                name: name.clone(),
            },
            MutationOp::DeleteFolder { folder } => ApiRequest::DeleteFolder { folder: *folder },
            MutationOp::CreateFeed { url, folder, .. } => ApiRequest::CreateFeed {
                url: url.clone(),
                folder: *folder,
            },
            MutationOp::MoveFeed { feed, folder } => ApiRequest::MoveFeed {
                feed: *feed,
                folder: *folder,
            },
            MutationOp::RenameFeed { feed, title } => ApiRequest::RenameFeed {
                feed: *feed,
                title: title.clone(),
            },
            MutationOp::DeleteFeed { feed } => ApiRequest::DeleteFeed { feed: *feed },
            MutationOp::MarkFeedRead { feed, newest } => ApiRequest::MarkFeedRead {
                feed: *feed,
                newest: *newest,
            },
        }
    }

    /// Returns a short name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ApiRequest::Version => "version",
            ApiRequest::Status => "status",
            ApiRequest::FetchFolders => "fetch-folders",
            ApiRequest::FetchFeeds => "fetch-feeds",
            ApiRequest::FetchItems(_) => "fetch-items",
            ApiRequest::CreateFolder { .. } => "create-folder",
            ApiRequest::RenameFolder { .. } => "rename-folder",
            ApiRequest::DeleteFolder { .. } => "delete-folder",
            ApiRequest::CreateFeed { .. } => "create-feed",
            ApiRequest::MoveFeed { .. } => "move-feed",
            ApiRequest::RenameFeed { .. } => "rename-feed",
            ApiRequest::DeleteFeed { .. } => "delete-feed",
            ApiRequest::MarkFeedRead { .. } => "mark-feed-read",
            ApiRequest::MarkItems { read: true, .. } => "mark-items-read",
            ApiRequest::MarkItems { read: false, .. } => "mark-items-unread",
            ApiRequest::StarItems { starred: true, .. } => "star-items",
            ApiRequest::StarItems { starred: false, .. } => "unstar-items",
        }
    }

    /// Returns true for deletions, whose 404 means "already gone".
    #[must_use]
    pub fn is_delete(&self) -> bool {
        matches!(
            self,
            ApiRequest::DeleteFolder { .. } | ApiRequest::DeleteFeed { .. }
        )
    }

    /// Checks the typed parameters.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameters` for blank names, placeholder or
    /// non-positive ids, empty item lists, or a zero page size.
    pub fn validate(&self) -> ApiResult<()> {
        match self {
            ApiRequest::Version
            | ApiRequest::Status
            | ApiRequest::FetchFolders
            | ApiRequest::FetchFeeds => Ok(()),
            ApiRequest::FetchItems(params) => {
                if params.batch_size == 0 {
                    return Err(ApiError::invalid("batch size must be positive"));
                }
                if params.offset < 0 {
                    return Err(ApiError::invalid("item offset must not be negative"));
                }
                Ok(())
            }
            ApiRequest::CreateFolder { name } => non_blank("folder name", name),
            ApiRequest::RenameFolder { folder, name } => {
                server_id("folder", folder.get())?;
                non_blank("folder name", name)
            }
            ApiRequest::DeleteFolder { folder } => server_id("folder", folder.get()),
            ApiRequest::CreateFeed { url, folder } => {
                non_blank("feed url", url)?;
                optional_folder(*folder)
            }
            ApiRequest::MoveFeed { feed, folder } => {
                server_id("feed", feed.get())?;
                optional_folder(*folder)
            }
            ApiRequest::RenameFeed { feed, title } => {
                server_id("feed", feed.get())?;
                non_blank("feed title", title)
            }
            ApiRequest::DeleteFeed { feed } => server_id("feed", feed.get()),
            ApiRequest::MarkFeedRead { feed, .. } => server_id("feed", feed.get()),
            ApiRequest::MarkItems { items, .. } => {
                if items.is_empty() {
                    return Err(ApiError::invalid("no items to mark"));
                }
                items.iter().try_for_each(|id| server_id("item", id.get()))
            }
            ApiRequest::StarItems { items, .. } => {
                if items.is_empty() {
                    return Err(ApiError::invalid("no items to star"));
                }
                items.iter().try_for_each(|item| {
                    server_id("item", item.article.get())?;
                    server_id("feed", item.feed.get())
                })
            }
        }
    }

    /// Builds the single call for this request. For [`ApiRequest::FetchItems`]
    /// this is the first page; later pages come from [`ApiRequest::item_page`].
    #[must_use]
    pub fn endpoint(&self) -> Endpoint {
        match self {
            ApiRequest::Version => Endpoint::get("version"),
            ApiRequest::Status => Endpoint::get("status"),
            ApiRequest::FetchFolders => Endpoint::get("folders"),
            ApiRequest::FetchFeeds => Endpoint::get("feeds"),
            ApiRequest::FetchItems(params) => Self::item_page(params, params.offset),
            ApiRequest::CreateFolder { name } => {
                Endpoint::with_body(Method::Post, "folders", json!({ "name": name }))
            }
            ApiRequest::RenameFolder { folder, name } => Endpoint::with_body(
                Method::Put,
                format!("folders/{folder}"),
                json!({ "name": name }),
            ),
            ApiRequest::DeleteFolder { folder } => Endpoint::delete(format!("folders/{folder}")),
            ApiRequest::CreateFeed { url, folder } => Endpoint::with_body(
                Method::Post,
                "feeds",
                json!({ "url": url, "folderId": folder.map_or(0, FolderId::get) }),
            ),
            ApiRequest::MoveFeed { feed, folder } => Endpoint::with_body(
                Method::Put,
                format!("feeds/{feed}/move"),
                json!({ "folderId": folder.map_or(0, FolderId::get) }),
            ),
            ApiRequest::RenameFeed { feed, title } => Endpoint::with_body(
                Method::Put,
                format!("feeds/{feed}/rename"),
                json!({ "feedTitle": title }),
            ),
            ApiRequest::DeleteFeed { feed } => Endpoint::delete(format!("feeds/{feed}")),
            ApiRequest::MarkFeedRead { feed, newest } => Endpoint::with_body(
                Method::Put,
                format!("feeds/{feed}/read"),
                json!({ "newestItemId": newest.get() }),
            ),
            ApiRequest::MarkItems { items, read } => {
                let action = if *read { "read" } else { "unread" };
                let ids: Vec<i64> = items.iter().map(|id| id.get()).collect();
                Endpoint::with_body(
                    Method::Put,
                    format!("items/{action}/multiple"),
                    json!({ "itemIds": ids }),
                )
            }
            ApiRequest::StarItems {
                items,
                starred,
                by_id,
            } => {
                let action = if *starred { "star" } else { "unstar" };
                let body = if *by_id {
                    let ids: Vec<i64> = items.iter().map(|item| item.article.get()).collect();
                    json!({ "itemIds": ids })
                } else {
                    let items: Vec<_> = items
                        .iter()
                        .map(|item| json!({ "feedId": item.feed.get(), "guidHash": item.guid_hash }))
                        .collect();
                    json!({ "items": items })
                };
                Endpoint::with_body(Method::Put, format!("items/{action}/multiple"), body)
            }
        }
    }

    /// Builds the call for one page of an item fetch. `offset` is the
    /// smallest item id of the previous page, or 0 for the first page.
    #[must_use]
    pub fn item_page(params: &FetchItems, offset: i64) -> Endpoint {
        Endpoint::get(format!(
            "items/updated?lastModified={}&batchSize={}&offset={}&type=3&id=0",
            params.since, params.batch_size, offset
        ))
    }

    /// Parses the body of a successful response.
    ///
    /// # Errors
    ///
    /// Returns `Parse` if the body does not have the expected shape.
    pub fn parse(&self, body: &str) -> ApiResult<ApiResponse> {
        match self {
            ApiRequest::Version => {
                let envelope: VersionEnvelope = decode(body)?;
                Ok(ApiResponse::Version(parse_version(&envelope.version)?))
            }
            ApiRequest::Status => {
                let envelope: StatusEnvelope = decode(body)?;
                Ok(ApiResponse::Status(ServerStatus {
                    version: parse_version(&envelope.version)?,
                    cron_warning: envelope.warnings.improperly_configured_cron,
                    db_charset_warning: envelope.warnings.incorrect_db_charset,
                }))
            }
            ApiRequest::FetchFolders => {
                let envelope: FoldersEnvelope = decode(body)?;
                Ok(ApiResponse::Folders(
                    envelope.folders.into_iter().map(Folder::from).collect(),
                ))
            }
            ApiRequest::FetchFeeds => {
                let envelope: FeedsEnvelope = decode(body)?;
                Ok(ApiResponse::Feeds(FeedList {
                    feeds: envelope.feeds.into_iter().map(Feed::from).collect(),
                    starred_count: envelope.starred_count,
                    newest_item: envelope.newest_item_id.map(ArticleId::new),
                }))
            }
            ApiRequest::FetchItems(_) => {
                let page = parse_item_page(body)?;
                let max_marker = page.iter().map(|a| a.sync_marker).max().unwrap_or(0);
                Ok(ApiResponse::Items(ItemBatch {
                    articles: page,
                    max_marker,
                    pages: 1,
                    resume_offset: None,
                }))
            }
            ApiRequest::CreateFolder { .. } => {
                let envelope: FoldersEnvelope = decode(body)?;
                let folder = envelope
                    .folders
                    .into_iter()
                    .next()
                    .ok_or_else(|| ApiError::parse("create folder returned no folder"))?;
                Ok(ApiResponse::FolderCreated(folder.into()))
            }
            ApiRequest::CreateFeed { .. } => {
                let envelope: FeedsEnvelope = decode(body)?;
                let feed = envelope
                    .feeds
                    .into_iter()
                    .next()
                    .ok_or_else(|| ApiError::parse("create feed returned no feed"))?;
                Ok(ApiResponse::FeedCreated(feed.into()))
            }
            _ => Ok(ApiResponse::Done),
        }
    }
}

impl fmt::Display for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parses one page of `items/updated`.
pub(crate) fn parse_item_page(body: &str) -> ApiResult<Vec<Article>> {
    let envelope: ItemsEnvelope = decode(body)?;
    Ok(envelope.items.into_iter().map(Article::from).collect())
}

fn decode<T: DeserializeOwned>(body: &str) -> ApiResult<T> {
    serde_json::from_str(body).map_err(|e| ApiError::parse(e.to_string()))
}

fn parse_version(text: &str) -> ApiResult<ServerVersion> {
    ServerVersion::parse(text).ok_or_else(|| ApiError::parse(format!("invalid version {text:?}")))
}

fn non_blank(what: &str, value: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        Err(ApiError::invalid(format!("{what} must not be empty")))
    } else {
        Ok(())
    }
}

fn server_id(what: &str, id: i64) -> ApiResult<()> {
    if id > 0 {
        Ok(())
    } else {
        Err(ApiError::invalid(format!("{what} id {id} is not a server id")))
    }
}

fn optional_folder(folder: Option<FolderId>) -> ApiResult<()> {
    folder.map_or(Ok(()), |folder| server_id("folder", folder.get()))
}
