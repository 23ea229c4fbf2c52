//! Backend API client with transparent auth refresh
//!
//! Two layers compose the crate:
//! 1. `transport` issues exactly one HTTP exchange — header merge, body
//!    encoding, merged timeout/cancellation, response parsing — and
//!    classifies every failure into a structured [`ApiError`].
//! 2. `client` orchestrates a logical request on top of it: when
//!    attempt 0 fails with a refresh-eligible error, it runs the
//!    injected refresh handler (deduplicated across concurrent
//!    callers) and retries the request exactly once.
//!
//! Request flow:
//! 1. Caller builds a [`RequestOptions`] and calls
//!    [`ApiClient::request`]
//! 2. The transport sends attempt 0
//! 3. On a refresh-eligible failure, the client joins or starts the
//!    shared refresh, then sends attempt 1
//! 4. The caller receives a [`ResponseValue`] or an [`ApiError`]

pub mod client;
pub mod error;
pub mod request;
pub mod transport;

pub use client::{
    ApiClient, ApiClientConfig, RefreshHandler, RefreshPolicy, default_refresh_policy,
};
pub use error::ApiError;
pub use request::{
    DEFAULT_TIMEOUT_MS, ParseMode, RequestBody, RequestContext, RequestOptions,
};
pub use transport::ResponseValue;
