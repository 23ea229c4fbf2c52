//! Refresh-aware request orchestration
//!
//! Wraps the transport with one recovery path: when attempt 0 fails
//! with a refresh-eligible error (by default 401 + `token_expired`),
//! the client runs the configured refresh handler and re-sends the
//! request exactly once. Concurrent failures share a single in-flight
//! refresh: the first failure starts it, every other failure joins it,
//! and the slot is cleared unconditionally on settlement so the next
//! failure starts a fresh refresh.
//!
//! The refresh slot is owned by the client instance, so independent
//! clients (and tests) never cross-contaminate.

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use reqwest::header::HeaderMap;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::request::{DEFAULT_TIMEOUT_MS, RequestContext, RequestOptions, join_url};
use crate::transport::{self, ResponseValue};

/// Zero-argument refresh operation injected by the caller.
///
/// The client only observes success or failure; the canonical handler
/// calls back into the same client (`POST` to the refresh endpoint with
/// `skip_auth_refresh` set).
pub type RefreshHandler =
    Arc<dyn Fn() -> BoxFuture<'static, Result<(), ApiError>> + Send + Sync>;

/// Eligibility rule: is this failure worth a refresh-and-retry?
///
/// A plain function value held in configuration, swappable per
/// deployment. Receives the error and the attempt context; must not
/// panic.
pub type RefreshPolicy = Arc<dyn Fn(&ApiError, &RequestContext) -> bool + Send + Sync>;

type RefreshFuture = Shared<BoxFuture<'static, Result<(), Arc<ApiError>>>>;

/// Default eligibility rule: HTTP 401 with error code `token_expired`,
/// compared case-insensitively after trimming.
pub fn default_refresh_policy(error: &ApiError, _context: &RequestContext) -> bool {
    error.status == 401 && error.normalized_code().as_deref() == Some("token_expired")
}

/// Construction-time client configuration. Per-request options may
/// override headers and timeout.
pub struct ApiClientConfig {
    pub base_url: String,
    pub default_headers: HeaderMap,
    /// Applied when a request carries no timeout of its own. 0 disables.
    pub default_timeout_ms: u64,
    pub refresh_policy: RefreshPolicy,
}

impl ApiClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            default_headers: HeaderMap::new(),
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            refresh_policy: Arc::new(default_refresh_policy),
        }
    }

    pub fn default_headers(mut self, headers: HeaderMap) -> Self {
        self.default_headers = headers;
        self
    }

    pub fn default_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.default_timeout_ms = timeout_ms;
        self
    }

    pub fn refresh_policy<F>(mut self, policy: F) -> Self
    where
        F: Fn(&ApiError, &RequestContext) -> bool + Send + Sync + 'static,
    {
        self.refresh_policy = Arc::new(policy);
        self
    }
}

struct Inner {
    http: reqwest::Client,
    config: ApiClientConfig,
    refresh_handler: RwLock<Option<RefreshHandler>>,
    refresh_in_flight: Mutex<Option<RefreshFuture>>,
}

/// API client with transparent auth refresh. Cheap to clone; clones
/// share the refresh slot and handler.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

impl ApiClient {
    /// Create a client from configuration and a prebuilt HTTP client
    /// (the caller decides cookie-store and TLS settings).
    pub fn new(config: ApiClientConfig, http: reqwest::Client) -> Self {
        Self {
            inner: Arc::new(Inner {
                http,
                config,
                refresh_handler: RwLock::new(None),
                refresh_in_flight: Mutex::new(None),
            }),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.inner.config.base_url
    }

    /// Install the refresh handler. Without one, every failure is
    /// terminal.
    pub async fn set_refresh_handler<F, Fut>(&self, handler: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ApiError>> + Send + 'static,
    {
        let handler: RefreshHandler = Arc::new(move || handler().boxed());
        *self.inner.refresh_handler.write().await = Some(handler);
    }

    pub async fn clear_refresh_handler(&self) {
        *self.inner.refresh_handler.write().await = None;
    }

    /// Execute a logical request: attempt 0, then — only for a
    /// refresh-eligible failure on a non-exempt request — one shared
    /// refresh followed by exactly one retry. The retry's outcome is
    /// final either way. A failed refresh propagates the refresh's own
    /// error and the original error is discarded.
    pub async fn request(&self, options: RequestOptions) -> Result<ResponseValue, ApiError> {
        if options.path.is_empty() {
            return Err(ApiError::transport(
                ApiError::NETWORK_ERROR,
                "request path must not be empty",
                RequestContext {
                    attempt: 0,
                    method: options.method.clone(),
                    path: String::new(),
                    skip_auth_refresh: options.skip_auth_refresh,
                    url: self.inner.config.base_url.clone(),
                },
                std::time::Duration::ZERO,
            ));
        }

        let error = match self.execute(&options, 0).await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if options.skip_auth_refresh {
            return Err(error);
        }

        let handler = self.inner.refresh_handler.read().await.clone();
        let Some(handler) = handler else {
            return Err(error);
        };

        if !(self.inner.config.refresh_policy)(&error, &error.context) {
            return Err(error);
        }

        warn!(
            method = %error.context.method,
            path = %error.context.path,
            status = error.status,
            "refresh-eligible failure, running auth refresh"
        );

        if let Err(refresh_error) = self.run_refresh(handler, &error.context).await {
            return Err((*refresh_error).clone());
        }

        self.execute(&options, 1).await
    }

    async fn execute(
        &self,
        options: &RequestOptions,
        attempt: u32,
    ) -> Result<ResponseValue, ApiError> {
        let context = RequestContext {
            attempt,
            method: options.method.clone(),
            path: options.path.clone(),
            skip_auth_refresh: options.skip_auth_refresh,
            url: join_url(&self.inner.config.base_url, &options.path),
        };
        debug!(
            method = %context.method,
            path = %context.path,
            attempt,
            "dispatching api request"
        );
        transport::send_once(
            &self.inner.http,
            &self.inner.config.default_headers,
            self.inner.config.default_timeout_ms,
            &context,
            options,
        )
        .await
    }

    /// Join the in-flight refresh if one exists, otherwise start one.
    ///
    /// The check-and-set holds the slot lock without suspending, so two
    /// failures racing here cannot both invoke the handler. The handler
    /// and the slot clearing both run on spawned tasks: the refresh
    /// completes and the slot is cleared even when every caller
    /// abandons its await, so the next eligible failure starts a fresh
    /// refresh instead of joining a stale settled one. The shared
    /// future only observes the settled outcome.
    async fn run_refresh(
        &self,
        handler: RefreshHandler,
        context: &RequestContext,
    ) -> Result<(), Arc<ApiError>> {
        let shared = {
            let mut slot = self.inner.refresh_in_flight.lock().await;
            if let Some(existing) = slot.as_ref() {
                debug!("joining in-flight auth refresh");
                existing.clone()
            } else {
                let inner = Arc::clone(&self.inner);
                let context = context.clone();
                let settle_context = context.clone();
                // Nested spawn isolates a panicking handler so the
                // settle task still clears the slot.
                let handler_task =
                    tokio::spawn(async move { handler().await.map_err(Arc::new) });
                let settle_task = tokio::spawn(async move {
                    let result = match handler_task.await {
                        Ok(result) => result,
                        Err(join_error) => Err(Arc::new(ApiError::transport(
                            ApiError::NETWORK_ERROR,
                            format!("auth refresh task failed: {join_error}"),
                            settle_context,
                            std::time::Duration::ZERO,
                        ))),
                    };
                    inner.refresh_in_flight.lock().await.take();
                    match &result {
                        Ok(()) => info!("auth refresh succeeded"),
                        Err(error) => {
                            warn!(status = error.status, "auth refresh failed");
                        }
                    }
                    result
                });
                let refresh: RefreshFuture = async move {
                    match settle_task.await {
                        Ok(result) => result,
                        Err(join_error) => Err(Arc::new(ApiError::transport(
                            ApiError::NETWORK_ERROR,
                            format!("auth refresh task failed: {join_error}"),
                            context,
                            std::time::Duration::ZERO,
                        ))),
                    }
                }
                .boxed()
                .shared();
                *slot = Some(refresh.clone());
                refresh
            }
        };
        shared.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::ParseMode;
    use serde_json::{Value, json};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn new_client(server: &MockServer) -> ApiClient {
        ApiClient::new(ApiClientConfig::new(server.uri()), reqwest::Client::new())
    }

    /// The canonical handler: POST the refresh endpoint through the
    /// same client, exempt from further refresh.
    async fn install_refresh_handler(client: &ApiClient) {
        let refresh_client = client.clone();
        client
            .set_refresh_handler(move || {
                let client = refresh_client.clone();
                async move {
                    client
                        .request(
                            RequestOptions::post("/auth/refresh")
                                .parse_as(ParseMode::Void)
                                .skip_auth_refresh(),
                        )
                        .await
                        .map(|_| ())
                }
            })
            .await;
    }

    async fn mount_refresh_ok(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(204))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn retries_once_after_nested_token_expired() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/profile"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"code": "TOKEN_EXPIRED", "message": "Access token expired"}
            })))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/profile"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;
        mount_refresh_ok(&server, 1).await;

        let client = new_client(&server);
        install_refresh_handler(&client).await;

        let value = client
            .request(RequestOptions::get("/profile"))
            .await
            .unwrap()
            .decode::<Value>()
            .unwrap();
        assert_eq!(value, json!({"ok": true}));
    }

    #[tokio::test]
    async fn concurrent_failures_share_one_refresh() {
        let server = MockServer::start().await;
        for resource in ["/alpha", "/beta"] {
            Mock::given(method("GET"))
                .and(path(resource))
                .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                    "code": "token_expired", "message": "Token expired"
                })))
                .up_to_n_times(1)
                .expect(1)
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path(resource))
                .respond_with(
                    ResponseTemplate::new(200).set_body_json(json!({"path": resource})),
                )
                .expect(1)
                .mount(&server)
                .await;
        }
        // The delay holds the refresh open long enough for the second
        // failure to join instead of starting its own.
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(204).set_delay(Duration::from_millis(200)))
            .expect(1)
            .mount(&server)
            .await;

        let client = new_client(&server);
        install_refresh_handler(&client).await;

        let (alpha, beta) = tokio::join!(
            client.request(RequestOptions::get("/alpha")),
            client.request(RequestOptions::get("/beta")),
        );
        let alpha = alpha.unwrap().decode::<Value>().unwrap();
        let beta = beta.unwrap().decode::<Value>().unwrap();
        assert_eq!(alpha["path"], "/alpha");
        assert_eq!(beta["path"], "/beta");
    }

    #[tokio::test]
    async fn refresh_failure_rejects_all_waiters_with_refresh_error() {
        let server = MockServer::start().await;
        for resource in ["/alpha", "/beta"] {
            Mock::given(method("GET"))
                .and(path(resource))
                .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                    "code": "token_expired", "message": "Token expired"
                })))
                .expect(1)
                .mount(&server)
                .await;
        }
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(json!({"code": "refresh_expired", "message": "Session ended"}))
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = new_client(&server);
        install_refresh_handler(&client).await;

        let (alpha, beta) = tokio::join!(
            client.request(RequestOptions::get("/alpha")),
            client.request(RequestOptions::get("/beta")),
        );

        for result in [alpha, beta] {
            let error = result.unwrap_err();
            // The refresh's own error, not the original request's
            assert_eq!(error.status, 401);
            assert_eq!(error.code.as_deref(), Some("refresh_expired"));
            assert_eq!(error.context.path, "/auth/refresh");
        }
    }

    #[tokio::test]
    async fn exempt_request_never_triggers_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "code": "token_expired", "message": "Token expired"
            })))
            .expect(1)
            .mount(&server)
            .await;
        mount_refresh_ok(&server, 0).await;

        let client = new_client(&server);
        install_refresh_handler(&client).await;

        let error = client
            .request(RequestOptions::post("/auth/login").skip_auth_refresh())
            .await
            .unwrap_err();
        assert_eq!(error.status, 401);
        assert_eq!(error.code.as_deref(), Some("token_expired"));
        assert_eq!(error.context.attempt, 0);
    }

    #[tokio::test]
    async fn missing_handler_makes_eligible_failure_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/profile"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "code": "token_expired", "message": "Token expired"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = new_client(&server);
        let error = client
            .request(RequestOptions::get("/profile"))
            .await
            .unwrap_err();
        assert_eq!(error.status, 401);
        assert_eq!(error.code.as_deref(), Some("token_expired"));
    }

    #[tokio::test]
    async fn non_eligible_failure_returns_original_error_unchanged() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/report"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(json!({"message": "boom"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        mount_refresh_ok(&server, 0).await;

        let client = new_client(&server);
        install_refresh_handler(&client).await;

        let error = client
            .request(RequestOptions::get("/report"))
            .await
            .unwrap_err();
        assert_eq!(error.status, 500);
        assert_eq!(error.code, None);
        assert_eq!(error.message, "boom");
    }

    #[tokio::test]
    async fn retry_failure_is_final_even_when_eligible_again() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/profile"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "code": "token_expired", "message": "Token expired"
            })))
            .expect(2)
            .mount(&server)
            .await;
        mount_refresh_ok(&server, 1).await;

        let client = new_client(&server);
        install_refresh_handler(&client).await;

        let error = client
            .request(RequestOptions::get("/profile"))
            .await
            .unwrap_err();
        assert_eq!(error.status, 401);
        assert_eq!(error.context.attempt, 1);
    }

    #[tokio::test]
    async fn settled_refresh_slot_allows_a_fresh_refresh() {
        let server = MockServer::start().await;
        for _ in 0..2 {
            Mock::given(method("GET"))
                .and(path("/data"))
                .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                    "code": "token_expired", "message": "Token expired"
                })))
                .up_to_n_times(1)
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/data"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({"n": 1})))
                .up_to_n_times(1)
                .mount(&server)
                .await;
        }
        mount_refresh_ok(&server, 2).await;

        let client = new_client(&server);
        install_refresh_handler(&client).await;

        client.request(RequestOptions::get("/data")).await.unwrap();
        client.request(RequestOptions::get("/data")).await.unwrap();
    }

    #[tokio::test]
    async fn abandoned_caller_still_clears_the_refresh_slot() {
        let server = MockServer::start().await;
        // One 401 per logical request (the abandoned caller never
        // retries), then the retry of the second request gets a 200.
        for _ in 0..2 {
            Mock::given(method("GET"))
                .and(path("/data"))
                .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                    "code": "token_expired", "message": "Token expired"
                })))
                .up_to_n_times(1)
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"n": 1})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(204).set_delay(Duration::from_millis(100)))
            .expect(2)
            .mount(&server)
            .await;

        let client = new_client(&server);
        install_refresh_handler(&client).await;

        // The caller gives up while its refresh is still in flight.
        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            client.request(RequestOptions::get("/data")),
        )
        .await;
        assert!(abandoned.is_err(), "caller should abandon mid-refresh");

        // Let the orphaned refresh settle and clear the slot.
        tokio::time::sleep(Duration::from_millis(300)).await;

        // The next eligible failure must start a second refresh rather
        // than join the stale settled one.
        client.request(RequestOptions::get("/data")).await.unwrap();
    }

    #[tokio::test]
    async fn custom_policy_drives_eligibility() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/legacy"))
            .respond_with(ResponseTemplate::new(419).set_body_string("session expired"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/legacy"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;
        mount_refresh_ok(&server, 1).await;

        let config =
            ApiClientConfig::new(server.uri()).refresh_policy(|error, _| error.status == 419);
        let client = ApiClient::new(config, reqwest::Client::new());
        install_refresh_handler(&client).await;

        client.request(RequestOptions::get("/legacy")).await.unwrap();
    }

    #[tokio::test]
    async fn empty_path_is_rejected_without_a_network_call() {
        let server = MockServer::start().await;
        let client = new_client(&server);
        let error = client.request(RequestOptions::get("")).await.unwrap_err();
        assert_eq!(error.status, 0);
        assert_eq!(error.code.as_deref(), Some(ApiError::NETWORK_ERROR));
    }

    #[tokio::test]
    async fn clients_do_not_share_refresh_state() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/profile"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "code": "token_expired", "message": "Token expired"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let with_handler = new_client(&server);
        install_refresh_handler(&with_handler).await;

        // A separate client never sees the other's handler
        let bare = new_client(&server);
        let error = bare
            .request(RequestOptions::get("/profile"))
            .await
            .unwrap_err();
        assert_eq!(error.code.as_deref(), Some("token_expired"));
    }
}
