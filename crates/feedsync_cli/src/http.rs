//! Blocking HTTP transport backed by `ureq`.

use feedsync_api::{HttpClient, HttpRequest, HttpResponse, TransportError};
use std::error::Error as _;
use std::io::{self, Read};
use tracing::trace;

/// [`HttpClient`] over a shared `ureq` agent.
///
/// Every error status is returned as a response; only failures to get any
/// response become a [`TransportError`].
pub struct UreqClient {
    agent: ureq::Agent,
}

impl UreqClient {
    pub fn new() -> Self {
        let agent = ureq::AgentBuilder::new()
            .user_agent(concat!("feedsync/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { agent }
    }
}

impl Default for UreqClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for UreqClient {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut call = self
            .agent
            .request(request.method.as_str(), &request.url)
            .timeout(request.timeout);
        for (name, value) in &request.headers {
            call = call.set(name, value);
        }

        let result = match &request.body {
            Some(body) => call.send_string(body),
            None => call.call(),
        };
        let response = match result {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(ureq::Error::Transport(transport)) => return Err(transport_error(&transport)),
        };

        let status = response.status();
        // `into_string` rejects bodies over 10 MB; item pages can be larger.
        let mut body = String::new();
        response
            .into_reader()
            .read_to_string(&mut body)
            .map_err(|e| io_error(&e))?;
        trace!(status, bytes = body.len(), "response body read");
        Ok(HttpResponse::new(status, body))
    }
}

fn transport_error(transport: &ureq::Transport) -> TransportError {
    let timed_out = transport
        .source()
        .and_then(|source| source.downcast_ref::<io::Error>())
        .is_some_and(is_timeout);
    if timed_out {
        TransportError::timeout(transport.to_string())
    } else {
        TransportError::new(transport.to_string())
    }
}

fn io_error(err: &io::Error) -> TransportError {
    if is_timeout(err) {
        TransportError::timeout(err.to_string())
    } else {
        TransportError::new(err.to_string())
    }
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}
