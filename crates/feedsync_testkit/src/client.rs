//! Loopback HTTP client.

use crate::server::FakeNewsServer;
use feedsync_api::{HttpClient, HttpRequest, HttpResponse, TransportError};
use std::sync::Arc;

/// An HTTP client that routes requests directly to a [`FakeNewsServer`].
///
/// Useful for testing without actual network overhead.
#[derive(Debug, Clone)]
pub struct LoopbackClient {
    server: Arc<FakeNewsServer>,
}

impl LoopbackClient {
    /// Creates a loopback client connected to `server`.
    pub fn new(server: Arc<FakeNewsServer>) -> Self {
        Self { server }
    }

    /// Returns the server behind this client.
    pub fn server(&self) -> &Arc<FakeNewsServer> {
        &self.server
    }
}

impl HttpClient for LoopbackClient {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.server.handle(request)
    }
}
