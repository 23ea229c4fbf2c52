//! Typed auth surface over the refresh-aware API client
//!
//! This crate wires the `api-client` core to the backend's auth
//! contract and exposes the thin typed operations the application
//! needs:
//!
//! 1. [`SessionClient::connect`] builds a cookie-backed client and
//!    installs the canonical refresh handler
//! 2. [`SessionClient::login`] / [`SessionClient::register`] /
//!    [`SessionClient::logout`] call the auth endpoints (all exempt
//!    from refresh retry)
//! 3. [`SessionClient::session_state`] probes the session endpoint,
//!    refreshing transparently when the access token expired
//! 4. [`redirect::login_redirect_target`] computes the login redirect
//!    when the refresh session itself is gone

pub mod config;
pub mod error;
pub mod redirect;
pub mod session;
pub mod types;

pub use config::{AuthPaths, DEFAULT_API_URL, api_url_from_env};
pub use error::{Error, Result};
pub use redirect::{login_redirect_target, should_redirect_to_login};
pub use session::SessionClient;
pub use types::{
    AuthSession, AuthTokens, AuthUser, LoginPayload, RegisterAccountPayload, RegisterPayload,
};
