//! Request descriptor and per-attempt request context
//!
//! `RequestOptions` is the caller-supplied descriptor: path, method,
//! headers, body, parse mode, timeout, and the auth-refresh exemption
//! flag. It is immutable once handed to the client. A `RequestContext`
//! is derived per physical attempt (attempt 0 and, after a refresh,
//! attempt 1) and is read-only.

use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tokio_util::sync::CancellationToken;

/// Timeout applied when neither the request nor the client config
/// specifies one.
pub const DEFAULT_TIMEOUT_MS: u64 = 15_000;

/// Request body variants.
///
/// `Text`, `Bytes`, and `Form` are pass-through: they are sent as-is
/// (form fields are URL-encoded by the HTTP layer). `Json` is encoded
/// by the transport, which also sets a JSON content-type header unless
/// the caller already provided one.
///
/// There is deliberately no one-shot stream variant: the client may
/// re-send the same body on the post-refresh retry, so every body must
/// be replayable. Pre-encoded binary payloads go through `Bytes`.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(serde_json::Value),
    Text(String),
    Bytes(Vec<u8>),
    Form(Vec<(String, String)>),
}

/// How the response body is turned into a [`ResponseValue`].
///
/// [`ResponseValue`]: crate::transport::ResponseValue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// Parse JSON when the content-type says JSON, otherwise fall back
    /// to returning the body text. The default.
    #[default]
    Json,
    /// Return the body text.
    Text,
    /// Discard the body.
    Void,
    /// Return the unparsed response.
    Raw,
}

/// Caller-supplied request descriptor.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub path: String,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
    pub parse_as: ParseMode,
    /// Per-request timeout in milliseconds. 0 disables the timeout;
    /// `None` falls back to the client default.
    pub timeout_ms: Option<u64>,
    /// Exempt this request from auth-refresh retry entirely.
    pub skip_auth_refresh: bool,
    /// External cancellation signal, merged with the internal timeout.
    pub cancel: Option<CancellationToken>,
}

impl RequestOptions {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            headers: HeaderMap::new(),
            body: None,
            parse_as: ParseMode::default(),
            timeout_ms: None,
            skip_auth_refresh: false,
            cancel: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Attach a JSON body. The transport encodes it and sets the
    /// content-type header if the caller has not.
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn parse_as(mut self, mode: ParseMode) -> Self {
        self.parse_as = mode;
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn skip_auth_refresh(mut self) -> Self {
        self.skip_auth_refresh = true;
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Read-only context for one physical attempt of a logical request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// 0 for the original attempt, 1 for the post-refresh retry.
    pub attempt: u32,
    pub method: Method,
    pub path: String,
    pub skip_auth_refresh: bool,
    /// Resolved absolute URL.
    pub url: String,
}

/// Join a base URL and a path. Absolute URLs pass through untouched.
pub(crate) fn join_url(base_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_owned();
    }

    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
