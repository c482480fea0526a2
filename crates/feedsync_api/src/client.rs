//! Executes request objects over an [`HttpClient`].

use crate::credentials::Credentials;
use crate::error::{ApiError, ApiResult};
use crate::http::{HttpClient, HttpRequest};
use crate::request::{
    parse_item_page, ApiRequest, ApiResponse, Endpoint, FeedList, FetchItems, ItemBatch,
    ServerStatus,
};
use crate::version::ServerVersion;
use feedsync_core::Folder;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, warn};

/// Path of the API root below the server URL.
pub const API_ROOT: &str = "index.php/apps/news/api/v1-2/";

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A News API client for one account.
///
/// # Example
///
/// ```rust,ignore
/// let api = ApiClient::new("https://cloud.example.com", credentials, http);
/// let version = api.version()?;
/// ```
pub struct ApiClient<C: HttpClient> {
    base_url: String,
    credentials: Credentials,
    client: C,
    timeout: Duration,
}

impl<C: HttpClient> ApiClient<C> {
    /// Creates a client for the server at `server_url`.
    pub fn new(server_url: &str, credentials: Credentials, client: C) -> Self {
        Self {
            base_url: format!("{}/{API_ROOT}", server_url.trim_end_matches('/')),
            credentials,
            client,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the API root URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Validates, sends, and parses `request`.
    ///
    /// Item fetches follow pagination until an empty or short page, a page
    /// with nothing new, or the item cap, and return one merged batch.
    ///
    /// # Errors
    ///
    /// Returns the classified [`ApiError`] of the first failing call.
    pub fn execute(&self, request: &ApiRequest) -> ApiResult<ApiResponse> {
        request.validate()?;

        if let ApiRequest::FetchItems(params) = request {
            return self.fetch_items(params).map(ApiResponse::Items);
        }

        match self.call(&request.endpoint()) {
            Ok(body) => request.parse(&body),
            Err(ApiError::ServerRejected { status: 404, .. }) if request.is_delete() => {
                debug!(request = request.name(), "already deleted on server");
                Ok(ApiResponse::Done)
            }
            Err(err) => Err(err),
        }
    }

    /// Sends one call and returns the body of a 2xx response.
    fn call(&self, endpoint: &Endpoint) -> ApiResult<String> {
        let mut headers = vec![
            ("Authorization".to_string(), self.credentials.basic_auth()),
            ("Accept".to_string(), "application/json".to_string()),
        ];
        if endpoint.body.is_some() {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }

        let request = HttpRequest {
            method: endpoint.method,
            url: format!("{}{}", self.base_url, endpoint.path),
            headers,
            body: endpoint.body.clone(),
            timeout: self.timeout,
        };

        let response = self.client.send(&request).map_err(|e| {
            warn!(method = %request.method, url = %request.url, error = %e, "request failed");
            if e.timed_out {
                ApiError::timeout(e.message)
            } else {
                ApiError::network(e.message)
            }
        })?;

        debug!(method = %request.method, url = %request.url, status = response.status, "response");
        if response.is_success() {
            Ok(response.body)
        } else {
            Err(ApiError::from_status(response.status, &response.body))
        }
    }

    fn fetch_items(&self, params: &FetchItems) -> ApiResult<ItemBatch> {
        let mut batch = ItemBatch::default();
        let mut seen = BTreeSet::new();
        let mut offset = params.offset;

        loop {
            let body = self.call(&ApiRequest::item_page(params, offset))?;
            let page = parse_item_page(&body)?;
            batch.pages += 1;

            let page_len = page.len();
            let mut fresh = 0usize;
            for article in page {
                offset = if offset == 0 {
                    article.id.get()
                } else {
                    offset.min(article.id.get())
                };
                if !seen.insert(article.id) {
                    continue;
                }
                fresh += 1;
                batch.max_marker = batch.max_marker.max(article.sync_marker);
                batch.articles.push(article);

                if params
                    .max_items
                    .is_some_and(|cap| batch.articles.len() >= cap)
                {
                    debug!(items = batch.articles.len(), offset, "item cap reached");
                    batch.resume_offset = Some(offset);
                    return Ok(batch);
                }
            }

            if page_len == 0 || fresh == 0 || page_len < params.batch_size as usize {
                break;
            }
        }

        debug!(
            items = batch.articles.len(),
            pages = batch.pages,
            max_marker = batch.max_marker,
            "items fetched"
        );
        Ok(batch)
    }

    /// Fetches the server version.
    ///
    /// # Errors
    ///
    /// Returns the classified error of the call.
    pub fn version(&self) -> ApiResult<ServerVersion> {
        match self.execute(&ApiRequest::Version)? {
            ApiResponse::Version(version) => Ok(version),
            other => Err(unexpected(&other)),
        }
    }

    /// Fetches the server status.
    ///
    /// # Errors
    ///
    /// Returns the classified error of the call.
    pub fn status(&self) -> ApiResult<ServerStatus> {
        match self.execute(&ApiRequest::Status)? {
            ApiResponse::Status(status) => Ok(status),
            other => Err(unexpected(&other)),
        }
    }

    /// Fetches all folders.
    ///
    /// # Errors
    ///
    /// Returns the classified error of the call.
    pub fn folders(&self) -> ApiResult<Vec<Folder>> {
        match self.execute(&ApiRequest::FetchFolders)? {
            ApiResponse::Folders(folders) => Ok(folders),
            other => Err(unexpected(&other)),
        }
    }

    /// Fetches all feeds.
    ///
    /// # Errors
    ///
    /// Returns the classified error of the call.
    pub fn feeds(&self) -> ApiResult<FeedList> {
        match self.execute(&ApiRequest::FetchFeeds)? {
            ApiResponse::Feeds(feeds) => Ok(feeds),
            other => Err(unexpected(&other)),
        }
    }

    /// Fetches items changed since `params.since`.
    ///
    /// # Errors
    ///
    /// Returns the classified error of the first failing page.
    pub fn items(&self, params: FetchItems) -> ApiResult<ItemBatch> {
        match self.execute(&ApiRequest::FetchItems(params))? {
            ApiResponse::Items(batch) => Ok(batch),
            other => Err(unexpected(&other)),
        }
    }
}

fn unexpected(response: &ApiResponse) -> ApiError {
    ApiError::parse(format!("unexpected response {response:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpResponse, Method, TransportError};
    use parking_lot::Mutex;

    /// Replays canned responses and records requests.
    struct Scripted {
        responses: Mutex<Vec<Result<HttpResponse, TransportError>>>,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl Scripted {
        fn new(mut responses: Vec<Result<HttpResponse, TransportError>>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl HttpClient for Scripted {
        fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            self.seen.lock().push(request.clone());
            self.responses
                .lock()
                .pop()
                .unwrap_or_else(|| Ok(HttpResponse::new(500, "script exhausted")))
        }
    }

    fn items_page(ids: std::ops::RangeInclusive<i64>) -> Result<HttpResponse, TransportError> {
        let items: Vec<String> = ids
            .rev()
            .map(|id| {
                format!(
                    r#"{{"id":{id},"guidHash":"h{id}","feedId":1,"unread":true,"starred":false,"lastModified":{}}}"#,
                    id * 10
                )
            })
            .collect();
        Ok(HttpResponse::new(200, format!(r#"{{"items":[{}]}}"#, items.join(","))))
    }

    fn client(script: &Scripted) -> ApiClient<&Scripted> {
        ApiClient::new(
            "https://cloud.example.com/",
            Credentials::new("alice", "secret"),
            script,
        )
    }

    #[test]
    fn sends_basic_auth_to_api_root() {
        let script = Scripted::new(vec![Ok(HttpResponse::new(200, r#"{"version":"18.1.0"}"#))]);
        let version = client(&script).version().unwrap();
        assert_eq!(version, ServerVersion::new(18, 1, 0));

        let seen = script.seen.lock();
        assert_eq!(
            seen[0].url,
            "https://cloud.example.com/index.php/apps/news/api/v1-2/version"
        );
        assert_eq!(seen[0].method, Method::Get);
        assert_eq!(seen[0].header("authorization"), Some("Basic YWxpY2U6c2VjcmV0"));
    }

    #[test]
    fn follows_pages_until_empty() {
        let script = Scripted::new(vec![
            items_page(101..=150),
            items_page(51..=100),
            items_page(1..=50),
            Ok(HttpResponse::new(200, r#"{"items":[]}"#)),
        ]);
        let batch = client(&script)
            .items(FetchItems::since(0).with_batch_size(50))
            .unwrap();

        assert_eq!(batch.articles.len(), 150);
        assert_eq!(batch.max_marker, 1500);
        assert_eq!(batch.pages, 4);
        let seen = script.seen.lock();
        assert!(seen[1].url.contains("offset=101"));
        assert!(seen[3].url.contains("offset=1&"));
    }

    #[test]
    fn item_cap_stops_early() {
        let script = Scripted::new(vec![items_page(51..=100), items_page(1..=50)]);
        let batch = client(&script)
            .items(FetchItems::since(0).with_batch_size(50).with_max_items(60))
            .unwrap();
        assert_eq!(batch.articles.len(), 60);
        assert_eq!(batch.resume_offset, Some(41));
        assert_eq!(script.seen.lock().len(), 2);
    }

    #[test]
    fn capped_fetch_resumes_below_last_item() {
        let script = Scripted::new(vec![
            items_page(1..=40),
            Ok(HttpResponse::new(200, r#"{"items":[]}"#)),
        ]);
        let batch = client(&script)
            .items(
                FetchItems::since(0)
                    .with_batch_size(50)
                    .with_max_items(60)
                    .with_offset(41),
            )
            .unwrap();

        assert_eq!(batch.articles.len(), 40);
        assert_eq!(batch.resume_offset, None);
        let seen = script.seen.lock();
        assert!(seen[0].url.contains("offset=41&"));
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn uncapped_fetch_has_no_resume_offset() {
        let script = Scripted::new(vec![items_page(1..=10)]);
        let batch = client(&script)
            .items(FetchItems::since(0).with_batch_size(50))
            .unwrap();
        assert_eq!(batch.resume_offset, None);
    }

    #[test]
    fn repeated_page_stops_pagination() {
        // A server that ignores the offset keeps returning the same page.
        let script = Scripted::new(vec![items_page(1..=50), items_page(1..=50)]);
        let batch = client(&script)
            .items(FetchItems::since(0).with_batch_size(50))
            .unwrap();
        assert_eq!(batch.articles.len(), 50);
        assert_eq!(script.seen.lock().len(), 2);
    }

    #[test]
    fn delete_of_missing_entity_succeeds() {
        let script = Scripted::new(vec![Ok(HttpResponse::new(404, r#"{"message":"gone"}"#))]);
        let response = client(&script)
            .execute(&ApiRequest::DeleteFeed {
                feed: feedsync_core::FeedId::new(3),
            })
            .unwrap();
        assert_eq!(response, ApiResponse::Done);
    }

    #[test]
    fn timeout_is_retryable_network_error() {
        let script = Scripted::new(vec![Err(TransportError::timeout("timed out"))]);
        let err = client(&script).folders().unwrap_err();
        assert!(matches!(err, ApiError::Network { timed_out: true, .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn invalid_parameters_never_reach_the_wire() {
        let script = Scripted::new(vec![]);
        let err = client(&script)
            .execute(&ApiRequest::CreateFolder { name: "".into() })
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidParameters { .. }));
        assert!(script.seen.lock().is_empty());
    }
}
