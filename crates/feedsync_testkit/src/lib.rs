//! # feedsync testkit
//!
//! Test utilities for feedsync.
//!
//! This crate provides:
//! - [`FakeNewsServer`], an in-memory News API server with fault injection
//! - [`LoopbackClient`], an [`HttpClient`](feedsync_api::HttpClient) that
//!   routes requests straight into a fake server
//! - Store fixtures backed by temporary directories
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use feedsync_testkit::prelude::*;
//!
//! #[test]
//! fn pulls_from_fake_server() {
//!     let server = Arc::new(FakeNewsServer::default());
//!     let api = ApiClient::new(TEST_SERVER_URL, test_credentials(), LoopbackClient::new(server));
//!     // ... test operations
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod fixtures;
pub mod generators;
pub mod server;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::client::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::server::*;
}

pub use client::LoopbackClient;
pub use fixtures::*;
pub use server::{FakeNewsServer, Fault, RecordedRequest};
