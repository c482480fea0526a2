//! # feedsync API
//!
//! Request objects for the News REST API (`v1-2`).
//!
//! This crate provides:
//! - One [`ApiRequest`] variant per remote operation, with validation,
//!   request building, and typed response parsing
//! - An [`HttpClient`] seam so the transport can be swapped (ureq, loopback)
//! - [`ApiClient`], which executes requests and follows item pagination
//! - Server version parsing and the negotiated [`Capabilities`]
//!
//! ## Error classification
//!
//! Every failure is one of `Network`, `Authentication`, `ServerRejected`,
//! `Parse`, or `InvalidParameters`. Network failures (timeouts included)
//! and transient rejections (408, 429, 5xx) are retryable; everything else
//! is not.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod credentials;
mod error;
mod http;
mod request;
mod version;
pub mod wire;

pub use client::{ApiClient, API_ROOT, DEFAULT_TIMEOUT};
pub use credentials::Credentials;
pub use error::{ApiError, ApiResult};
pub use http::{HttpClient, HttpRequest, HttpResponse, Method, TransportError};
pub use request::{
    ApiRequest, ApiResponse, Endpoint, FeedList, FetchItems, ItemBatch, ServerStatus, StarTarget,
};
pub use version::{
    Capabilities, Capability, ServerVersion, MIN_SERVER_VERSION, STAR_BY_ITEM_IDS_SINCE,
};
