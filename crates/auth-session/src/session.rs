//! Session client wiring and typed auth operations
//!
//! Builds an [`ApiClient`] against the backend with the canonical
//! refresh handler installed (POST to the refresh endpoint, exempt from
//! further refresh), applies the exempt-path set to every request, and
//! exposes the thin typed surface: login, register, logout, and the
//! session probe.

use api_client::{
    ApiClient, ApiClientConfig, ApiError, ParseMode, RequestOptions, ResponseValue,
};
use tracing::debug;

use crate::config::{AuthPaths, api_url_from_env};
use crate::error::{Error, Result};
use crate::redirect::{login_redirect_target, should_redirect_to_login};
use crate::types::{AuthSession, AuthTokens, LoginPayload, RegisterPayload};

/// Backend session client.
///
/// Cheap to clone; clones share the underlying HTTP client, cookie
/// store, and refresh state.
#[derive(Clone)]
pub struct SessionClient {
    client: ApiClient,
    paths: AuthPaths,
}

impl SessionClient {
    /// Connect with a cookie-store-backed HTTP client (the access and
    /// refresh tokens travel as cookies).
    pub async fn connect(base_url: impl Into<String>, paths: AuthPaths) -> Result<Self> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self::with_http_client(base_url, paths, http).await)
    }

    /// Connect using `API_URL` and `AUTH_*_PATH` environment variables.
    pub async fn from_env() -> Result<Self> {
        Self::connect(api_url_from_env(), AuthPaths::from_env()).await
    }

    /// Build the session client around a prebuilt HTTP client.
    pub async fn with_http_client(
        base_url: impl Into<String>,
        paths: AuthPaths,
        http: reqwest::Client,
    ) -> Self {
        let config = ApiClientConfig::new(base_url).refresh_policy(|error, context| {
            !context.skip_auth_refresh && api_client::default_refresh_policy(error, context)
        });
        let client = ApiClient::new(config, http);

        let refresh_client = client.clone();
        let refresh_path = paths.refresh.clone();
        client
            .set_refresh_handler(move || {
                let client = refresh_client.clone();
                let path = refresh_path.clone();
                async move {
                    client
                        .request(
                            RequestOptions::post(path)
                                .parse_as(ParseMode::Void)
                                .skip_auth_refresh(),
                        )
                        .await
                        .map(|_| ())
                }
            })
            .await;

        Self { client, paths }
    }

    pub fn api(&self) -> &ApiClient {
        &self.client
    }

    pub fn paths(&self) -> &AuthPaths {
        &self.paths
    }

    /// Send a request, marking it exempt from refresh when its path is
    /// one of the auth endpoints.
    pub async fn request(
        &self,
        mut options: RequestOptions,
    ) -> std::result::Result<ResponseValue, ApiError> {
        if !options.skip_auth_refresh && self.paths.exempt(&options.path) {
            options = options.skip_auth_refresh();
        }
        self.client.request(options).await
    }

    pub async fn login(&self, payload: &LoginPayload) -> Result<AuthTokens> {
        let body = serde_json::to_value(payload)?;
        let value = self
            .request(RequestOptions::post(self.paths.login.as_str()).json(body))
            .await?;
        Ok(value.decode()?)
    }

    pub async fn register(&self, payload: &RegisterPayload) -> Result<AuthTokens> {
        let body = serde_json::to_value(payload)?;
        let value = self
            .request(RequestOptions::post(self.paths.register.as_str()).json(body))
            .await?;
        Ok(value.decode()?)
    }

    pub async fn logout(&self) -> Result<()> {
        self.request(
            RequestOptions::post(self.paths.logout.as_str()).parse_as(ParseMode::Void),
        )
        .await?;
        Ok(())
    }

    /// Probe the session endpoint. Never fails: a 401 means no active
    /// session, any other failure leaves the state unknown.
    pub async fn session_state(&self) -> AuthSession {
        match self
            .request(RequestOptions::get(self.paths.session.as_str()))
            .await
        {
            Ok(value) => match value.decode::<serde_json::Value>() {
                Ok(payload) => AuthSession::Authenticated(payload),
                Err(e) => {
                    debug!(error = %e, "session payload was not valid JSON");
                    AuthSession::Unknown
                }
            },
            Err(error) if error.status == 401 => AuthSession::Unauthenticated,
            Err(error) => {
                debug!(status = error.status, "session probe failed");
                AuthSession::Unknown
            }
        }
    }

    /// Compute the login redirect for an unrecoverable auth failure (a
    /// 401 from the refresh endpoint). Navigation itself is up to the
    /// caller.
    pub fn redirect_on_auth_failure(
        &self,
        error: &ApiError,
        current_path: &str,
    ) -> Option<String> {
        if !should_redirect_to_login(error, &self.paths.refresh) {
            return None;
        }
        login_redirect_target(current_path)
    }
}
