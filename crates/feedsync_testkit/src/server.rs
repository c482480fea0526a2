//! In-memory News API server.
//!
//! [`FakeNewsServer`] keeps folders, feeds, and items in memory and answers
//! the `v1-2` endpoints the engine uses. Every item change bumps a global
//! clock, so item markers grow strictly, as on the real server. Faults can
//! be injected per request or per route, and every request is logged.

use feedsync_api::wire::{
    FeedsEnvelope, FoldersEnvelope, ItemsEnvelope, StatusEnvelope, StatusWarnings,
    VersionEnvelope, WireFeed, WireFolder, WireItem,
};
use feedsync_api::{Credentials, HttpRequest, HttpResponse, Method, TransportError, API_ROOT};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, VecDeque};

/// A fault to inject instead of a normal answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// No response at all.
    Network,
    /// The per-call timeout elapses.
    Timeout,
    /// Answer with this status and an error body.
    Status(u16),
}

/// A request the server received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// Method.
    pub method: Method,
    /// Path relative to the API root, without query string.
    pub path: String,
    /// Query string, if any.
    pub query: Option<String>,
    /// Body, if any.
    pub body: Option<String>,
}

#[derive(Debug, Clone)]
struct ServerFeed {
    url: String,
    title: String,
    folder: Option<i64>,
}

#[derive(Debug, Clone)]
struct ServerItem {
    feed: i64,
    guid_hash: String,
    title: String,
    body: String,
    pub_date: i64,
    unread: bool,
    starred: bool,
    last_modified: u64,
}

#[derive(Debug)]
struct State {
    version: String,
    credentials: Credentials,
    cron_warning: bool,
    folders: BTreeMap<i64, String>,
    feeds: BTreeMap<i64, ServerFeed>,
    items: BTreeMap<i64, ServerItem>,
    next_id: i64,
    clock: u64,
    offline: bool,
    queued_faults: VecDeque<Fault>,
    route_faults: Vec<(Method, String, Fault)>,
    log: Vec<RecordedRequest>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

/// An in-memory News API server.
///
/// # Example
///
/// ```rust
/// use feedsync_testkit::FakeNewsServer;
///
/// let server = FakeNewsServer::new("alice", "secret");
/// let folder = server.add_folder("News");
/// let feed = server.add_feed("https://a.example/rss", Some(folder));
/// server.add_item(feed, "Hello");
/// assert_eq!(server.item_count(), 1);
/// ```
#[derive(Debug)]
pub struct FakeNewsServer {
    state: Mutex<State>,
}

impl Default for FakeNewsServer {
    fn default() -> Self {
        Self::new("alice", "secret")
    }
}

impl FakeNewsServer {
    /// Creates an empty server accepting `username`/`password`, reporting version 18.0.0.
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            state: Mutex::new(State {
                version: "18.0.0".to_string(),
                credentials: Credentials::new(username, password),
                cron_warning: false,
                folders: BTreeMap::new(),
                feeds: BTreeMap::new(),
                items: BTreeMap::new(),
                next_id: 0,
                clock: 0,
                offline: false,
                queued_faults: VecDeque::new(),
                route_faults: Vec::new(),
                log: Vec::new(),
            }),
        }
    }

    /// Sets the reported version string.
    pub fn set_version(&self, version: &str) {
        self.state.lock().version = version.to_string();
    }

    /// Sets the cron warning flag of the status endpoint.
    pub fn set_cron_warning(&self, warning: bool) {
        self.state.lock().cron_warning = warning;
    }

    /// Changes the accepted credentials.
    pub fn set_credentials(&self, username: &str, password: &str) {
        self.state.lock().credentials = Credentials::new(username, password);
    }

    // ------------------------------------------------------------------
    // Server-side state
    // ------------------------------------------------------------------

    /// Adds a folder and returns its id.
    pub fn add_folder(&self, name: &str) -> i64 {
        let mut state = self.state.lock();
        let id = state.next_id();
        state.folders.insert(id, name.to_string());
        id
    }

    /// Adds a feed and returns its id.
    pub fn add_feed(&self, url: &str, folder: Option<i64>) -> i64 {
        let mut state = self.state.lock();
        let id = state.next_id();
        state.feeds.insert(
            id,
            ServerFeed {
                url: url.to_string(),
                title: url.to_string(),
                folder,
            },
        );
        id
    }

    /// Adds an unread item and returns its id.
    pub fn add_item(&self, feed: i64, title: &str) -> i64 {
        let mut state = self.state.lock();
        let id = state.next_id();
        let marker = state.tick();
        state.items.insert(
            id,
            ServerItem {
                feed,
                guid_hash: format!("guid-{id}"),
                title: title.to_string(),
                body: format!("<p>{title}</p>"),
                pub_date: 1_700_000_000 + id,
                unread: true,
                starred: false,
                last_modified: marker,
            },
        );
        id
    }

    /// Adds `count` items to `feed` and returns their ids.
    pub fn add_items(&self, feed: i64, count: usize) -> Vec<i64> {
        (0..count)
            .map(|n| self.add_item(feed, &format!("Item {n}")))
            .collect()
    }

    /// Changes an item's read flag as another device would.
    pub fn set_item_unread(&self, id: i64, unread: bool) {
        let mut state = self.state.lock();
        let marker = state.tick();
        if let Some(item) = state.items.get_mut(&id) {
            item.unread = unread;
            item.last_modified = marker;
        }
    }

    /// Changes an item's title as a feed update would.
    pub fn set_item_title(&self, id: i64, title: &str) {
        let mut state = self.state.lock();
        let marker = state.tick();
        if let Some(item) = state.items.get_mut(&id) {
            item.title = title.to_string();
            item.last_modified = marker;
        }
    }

    /// Deletes a folder with its feeds and items.
    pub fn remove_folder(&self, id: i64) {
        let mut state = self.state.lock();
        delete_folder(&mut state, id);
    }

    /// Deletes a feed with its items.
    pub fn remove_feed(&self, id: i64) {
        let mut state = self.state.lock();
        delete_feed(&mut state, id);
    }

    /// Returns the item in wire form.
    pub fn item(&self, id: i64) -> Option<WireItem> {
        let state = self.state.lock();
        state.items.get(&id).map(|item| wire_item(id, item))
    }

    /// Returns the number of items.
    pub fn item_count(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Returns folder names by id.
    pub fn folders(&self) -> BTreeMap<i64, String> {
        self.state.lock().folders.clone()
    }

    /// Returns the feeds in wire form.
    pub fn feeds(&self) -> Vec<WireFeed> {
        let state = self.state.lock();
        state
            .feeds
            .iter()
            .map(|(id, feed)| wire_feed(&state, *id, feed))
            .collect()
    }

    /// Returns the highest item marker handed out.
    pub fn clock(&self) -> u64 {
        self.state.lock().clock
    }

    // ------------------------------------------------------------------
    // Fault injection and request log
    // ------------------------------------------------------------------

    /// While offline, every request fails with a network error.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    /// Makes the next request fail with `fault`. Queued faults apply in order.
    pub fn fail_next(&self, fault: Fault) {
        self.state.lock().queued_faults.push_back(fault);
    }

    /// Makes every request with `method` whose path starts with `prefix` fail.
    pub fn fail_route(&self, method: Method, prefix: &str, fault: Fault) {
        self.state
            .lock()
            .route_faults
            .push((method, prefix.to_string(), fault));
    }

    /// Removes all injected faults and goes back online.
    pub fn clear_faults(&self) {
        let mut state = self.state.lock();
        state.offline = false;
        state.queued_faults.clear();
        state.route_faults.clear();
    }

    /// Returns every request received so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().log.clone()
    }

    /// Counts requests with `method` whose path starts with `prefix`.
    pub fn request_count(&self, method: Method, prefix: &str) -> usize {
        self.state
            .lock()
            .log
            .iter()
            .filter(|r| r.method == method && r.path.starts_with(prefix))
            .count()
    }

    /// Clears the request log.
    pub fn clear_requests(&self) {
        self.state.lock().log.clear();
    }

    // ------------------------------------------------------------------
    // Request handling
    // ------------------------------------------------------------------

    /// Answers one HTTP request.
    ///
    /// # Errors
    ///
    /// Returns a transport error when offline or when a network fault is injected.
    pub fn handle(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut state = self.state.lock();

        let relative = request
            .url
            .split_once(API_ROOT)
            .map_or(request.url.as_str(), |(_, rest)| rest);
        let (path, query) = match relative.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (relative.to_string(), None),
        };
        state.log.push(RecordedRequest {
            method: request.method,
            path: path.clone(),
            query: query.clone(),
            body: request.body.clone(),
        });

        if state.offline {
            return Err(TransportError::new("connection refused"));
        }
        let fault = state.queued_faults.pop_front().or_else(|| {
            state
                .route_faults
                .iter()
                .find(|(method, prefix, _)| *method == request.method && path.starts_with(prefix))
                .map(|(_, _, fault)| *fault)
        });
        match fault {
            Some(Fault::Network) => return Err(TransportError::new("connection reset")),
            Some(Fault::Timeout) => return Err(TransportError::timeout("operation timed out")),
            Some(Fault::Status(status)) => {
                return Ok(error(status, "injected failure"));
            }
            None => {}
        }

        if request.header("Authorization") != Some(state.credentials.basic_auth().as_str()) {
            return Ok(error(401, "Unauthorized"));
        }

        let body: Value = match request.body.as_deref() {
            Some(text) => match serde_json::from_str(text) {
                Ok(value) => value,
                Err(_) => return Ok(error(400, "malformed JSON body")),
            },
            None => Value::Null,
        };
        let query = parse_query(query.as_deref());
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

        Ok(route(&mut state, request.method, &segments, &query, &body))
    }
}

fn route(
    state: &mut State,
    method: Method,
    segments: &[&str],
    query: &BTreeMap<String, String>,
    body: &Value,
) -> HttpResponse {
    match (method, segments) {
        (Method::Get, ["version"]) => ok(&VersionEnvelope {
            version: state.version.clone(),
        }),
        (Method::Get, ["status"]) => ok(&StatusEnvelope {
            version: state.version.clone(),
            warnings: StatusWarnings {
                improperly_configured_cron: state.cron_warning,
                incorrect_db_charset: false,
            },
        }),
        (Method::Get, ["folders"]) => ok(&FoldersEnvelope {
            folders: state
                .folders
                .iter()
                .map(|(id, name)| WireFolder {
                    id: *id,
                    name: name.clone(),
                })
                .collect(),
        }),
        (Method::Get, ["feeds"]) => ok(&feeds_envelope(state, None)),
        (Method::Get, ["items", "updated"]) => items_updated(state, query),
        (Method::Post, ["folders"]) => create_folder(state, body),
        (Method::Put, ["folders", id]) => with_id(id, |id| rename_folder(state, id, body)),
        (Method::Delete, ["folders", id]) => with_id(id, |id| {
            if delete_folder(state, id) {
                empty()
            } else {
                error(404, "Folder does not exist")
            }
        }),
        (Method::Post, ["feeds"]) => create_feed(state, body),
        (Method::Put, ["feeds", id, "move"]) => with_id(id, |id| move_feed(state, id, body)),
        (Method::Put, ["feeds", id, "rename"]) => with_id(id, |id| rename_feed(state, id, body)),
        (Method::Put, ["feeds", id, "read"]) => with_id(id, |id| mark_feed_read(state, id, body)),
        (Method::Delete, ["feeds", id]) => with_id(id, |id| {
            if delete_feed(state, id) {
                empty()
            } else {
                error(404, "Feed does not exist")
            }
        }),
        (Method::Put, ["items", action, "multiple"]) => update_items(state, action, body),
        _ => error(404, "No such endpoint"),
    }
}

fn items_updated(state: &State, query: &BTreeMap<String, String>) -> HttpResponse {
    let number = |key: &str| query.get(key).and_then(|v| v.parse::<i64>().ok());
    let Some(since) = number("lastModified") else {
        return error(422, "lastModified is required");
    };
    let batch = number("batchSize").unwrap_or(-1);
    let offset = number("offset").unwrap_or(0);

    let mut items: Vec<WireItem> = state
        .items
        .iter()
        .rev()
        .filter(|(id, item)| {
            item.last_modified as i64 > since && (offset <= 0 || **id < offset)
        })
        .map(|(id, item)| wire_item(*id, item))
        .collect();
    if batch > 0 {
        items.truncate(batch as usize);
    }
    ok(&ItemsEnvelope { items })
}

fn create_folder(state: &mut State, body: &Value) -> HttpResponse {
    let name = body["name"].as_str().unwrap_or_default().trim().to_string();
    if name.is_empty() {
        return error(422, "Folder name can not be empty");
    }
    if state.folders.values().any(|existing| *existing == name) {
        return error(409, "Folder exists already");
    }
    let id = state.next_id();
    state.folders.insert(id, name.clone());
    ok(&FoldersEnvelope {
        folders: vec![WireFolder { id, name }],
    })
}

fn rename_folder(state: &mut State, id: i64, body: &Value) -> HttpResponse {
    let name = body["name"].as_str().unwrap_or_default().trim().to_string();
    if name.is_empty() {
        return error(422, "Folder name can not be empty");
    }
    if !state.folders.contains_key(&id) {
        return error(404, "Folder does not exist");
    }
    if state
        .folders
        .iter()
        .any(|(other, existing)| *other != id && *existing == name)
    {
        return error(409, "Folder exists already");
    }
    state.folders.insert(id, name);
    empty()
}

fn delete_folder(state: &mut State, id: i64) -> bool {
    if state.folders.remove(&id).is_none() {
        return false;
    }
    let feeds: Vec<i64> = state
        .feeds
        .iter()
        .filter(|(_, feed)| feed.folder == Some(id))
        .map(|(id, _)| *id)
        .collect();
    for feed in feeds {
        delete_feed(state, feed);
    }
    true
}

fn create_feed(state: &mut State, body: &Value) -> HttpResponse {
    let url = body["url"].as_str().unwrap_or_default().trim().to_string();
    if url.is_empty() {
        return error(422, "Feed url can not be empty");
    }
    let folder = body["folderId"].as_i64().filter(|id| *id > 0);
    if let Some(folder) = folder {
        if !state.folders.contains_key(&folder) {
            return error(422, "Folder does not exist");
        }
    }
    if state.feeds.values().any(|feed| feed.url == url) {
        return error(409, "Feed exists already");
    }
    let id = state.next_id();
    state.feeds.insert(
        id,
        ServerFeed {
            url: url.clone(),
            title: url,
            folder,
        },
    );
    ok(&feeds_envelope(state, Some(id)))
}

fn move_feed(state: &mut State, id: i64, body: &Value) -> HttpResponse {
    let folder = body["folderId"].as_i64().filter(|id| *id > 0);
    if let Some(folder) = folder {
        if !state.folders.contains_key(&folder) {
            return error(422, "Folder does not exist");
        }
    }
    match state.feeds.get_mut(&id) {
        Some(feed) => {
            feed.folder = folder;
            empty()
        }
        None => error(404, "Feed does not exist"),
    }
}

fn rename_feed(state: &mut State, id: i64, body: &Value) -> HttpResponse {
    let title = body["feedTitle"].as_str().unwrap_or_default().trim().to_string();
    if title.is_empty() {
        return error(422, "Feed title can not be empty");
    }
    match state.feeds.get_mut(&id) {
        Some(feed) => {
            feed.title = title;
            empty()
        }
        None => error(404, "Feed does not exist"),
    }
}

fn delete_feed(state: &mut State, id: i64) -> bool {
    if state.feeds.remove(&id).is_none() {
        return false;
    }
    state.items.retain(|_, item| item.feed != id);
    true
}

fn mark_feed_read(state: &mut State, id: i64, body: &Value) -> HttpResponse {
    if !state.feeds.contains_key(&id) {
        return error(404, "Feed does not exist");
    }
    let newest = body["newestItemId"].as_i64().unwrap_or_default();
    let targets: Vec<i64> = state
        .items
        .iter()
        .filter(|(item_id, item)| item.feed == id && **item_id <= newest && item.unread)
        .map(|(item_id, _)| *item_id)
        .collect();
    for item_id in targets {
        let marker = state.tick();
        if let Some(item) = state.items.get_mut(&item_id) {
            item.unread = false;
            item.last_modified = marker;
        }
    }
    empty()
}

fn update_items(state: &mut State, action: &str, body: &Value) -> HttpResponse {
    let ids: Vec<i64> = if let Some(ids) = body["itemIds"].as_array() {
        ids.iter().filter_map(Value::as_i64).collect()
    } else if let Some(items) = body["items"].as_array() {
        items
            .iter()
            .filter_map(|entry| {
                let feed = entry["feedId"].as_i64()?;
                let guid_hash = entry["guidHash"].as_str()?;
                state
                    .items
                    .iter()
                    .find(|(_, item)| item.feed == feed && item.guid_hash == guid_hash)
                    .map(|(id, _)| *id)
            })
            .collect()
    } else {
        return error(422, "itemIds or items required");
    };

    for id in ids {
        let marker = state.clock + 1;
        let Some(item) = state.items.get_mut(&id) else {
            continue;
        };
        let changed = match action {
            "read" => std::mem::replace(&mut item.unread, false),
            "unread" => !std::mem::replace(&mut item.unread, true),
            "star" => !std::mem::replace(&mut item.starred, true),
            "unstar" => std::mem::replace(&mut item.starred, false),
            _ => return error(404, "No such endpoint"),
        };
        if changed {
            item.last_modified = marker;
            state.clock = marker;
        }
    }
    empty()
}

fn feeds_envelope(state: &State, only: Option<i64>) -> FeedsEnvelope {
    FeedsEnvelope {
        feeds: state
            .feeds
            .iter()
            .filter(|(id, _)| only.map_or(true, |only| only == **id))
            .map(|(id, feed)| wire_feed(state, *id, feed))
            .collect(),
        starred_count: Some(state.items.values().filter(|i| i.starred).count() as u32),
        newest_item_id: state.items.keys().next_back().copied(),
    }
}

fn wire_feed(state: &State, id: i64, feed: &ServerFeed) -> WireFeed {
    WireFeed {
        id,
        url: feed.url.clone(),
        title: feed.title.clone(),
        favicon_link: None,
        folder_id: Some(feed.folder.unwrap_or(0)),
        unread_count: state
            .items
            .values()
            .filter(|item| item.feed == id && item.unread)
            .count() as u32,
        link: None,
    }
}

fn wire_item(id: i64, item: &ServerItem) -> WireItem {
    WireItem {
        id,
        guid: format!("urn:item:{id}"),
        guid_hash: item.guid_hash.clone(),
        feed_id: item.feed,
        title: Some(item.title.clone()),
        author: None,
        url: Some(format!("https://example.com/items/{id}")),
        body: Some(item.body.clone()),
        pub_date: Some(item.pub_date),
        updated_date: None,
        last_modified: item.last_modified,
        unread: item.unread,
        starred: item.starred,
    }
}

fn with_id(raw: &str, f: impl FnOnce(i64) -> HttpResponse) -> HttpResponse {
    match raw.parse() {
        Ok(id) => f(id),
        Err(_) => error(404, "No such endpoint"),
    }
}

fn parse_query(query: Option<&str>) -> BTreeMap<String, String> {
    query
        .unwrap_or_default()
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

fn ok<T: Serialize>(payload: &T) -> HttpResponse {
    match serde_json::to_string(payload) {
        Ok(body) => HttpResponse::new(200, body),
        Err(e) => error(500, &e.to_string()),
    }
}

fn empty() -> HttpResponse {
    HttpResponse::new(200, "")
}

fn error(status: u16, message: &str) -> HttpResponse {
    HttpResponse::new(status, json!({ "message": message }).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn request(server: &FakeNewsServer, method: Method, path: &str, body: Option<Value>) -> HttpResponse {
        let request = HttpRequest {
            method,
            url: format!("https://cloud.example.com/{API_ROOT}{path}"),
            headers: vec![(
                "Authorization".to_string(),
                Credentials::new("alice", "secret").basic_auth(),
            )],
            body: body.map(|b| b.to_string()),
            timeout: Duration::from_secs(1),
        };
        server.handle(&request).unwrap()
    }

    #[test]
    fn rejects_wrong_credentials() {
        let server = FakeNewsServer::new("alice", "other");
        let response = request(&server, Method::Get, "version", None);
        assert_eq!(response.status, 401);
    }

    #[test]
    fn create_folder_conflict() {
        let server = FakeNewsServer::default();
        server.add_folder("News");
        let response = request(&server, Method::Post, "folders", Some(json!({"name": "News"})));
        assert_eq!(response.status, 409);
    }

    #[test]
    fn marking_read_bumps_marker() {
        let server = FakeNewsServer::default();
        let feed = server.add_feed("https://a.example/rss", None);
        let item = server.add_item(feed, "Hello");
        let before = server.item(item).unwrap().last_modified;

        request(
            &server,
            Method::Put,
            "items/read/multiple",
            Some(json!({"itemIds": [item]})),
        );
        let after = server.item(item).unwrap();
        assert!(!after.unread);
        assert!(after.last_modified > before);

        // Marking again changes nothing.
        request(
            &server,
            Method::Put,
            "items/read/multiple",
            Some(json!({"itemIds": [item]})),
        );
        assert_eq!(server.item(item).unwrap().last_modified, after.last_modified);
    }

    #[test]
    fn pages_newest_first() {
        let server = FakeNewsServer::default();
        let feed = server.add_feed("https://a.example/rss", None);
        let ids = server.add_items(feed, 5);

        let response = request(
            &server,
            Method::Get,
            &format!("items/updated?lastModified=0&batchSize=2&offset={}", ids[3]),
            None,
        );
        let page: ItemsEnvelope = serde_json::from_str(&response.body).unwrap();
        let got: Vec<i64> = page.items.iter().map(|i| i.id).collect();
        assert_eq!(got, vec![ids[2], ids[1]]);
    }

    #[test]
    fn injected_faults_apply_once() {
        let server = FakeNewsServer::default();
        server.fail_next(Fault::Status(503));
        assert_eq!(request(&server, Method::Get, "folders", None).status, 503);
        assert_eq!(request(&server, Method::Get, "folders", None).status, 200);
        assert_eq!(server.request_count(Method::Get, "folders"), 2);
    }
}
