//! Endpoint configuration
//!
//! Resolution order: env vars > defaults. The backend base URL comes
//! from `API_URL`; individual auth endpoint paths can be remapped via
//! `AUTH_*_PATH` vars. Login, logout, register, and the refresh call
//! itself are exempt from refresh retry.

pub const DEFAULT_API_URL: &str = "http://localhost:3000";

/// Auth endpoint paths on the backend.
#[derive(Debug, Clone)]
pub struct AuthPaths {
    pub login: String,
    pub register: String,
    pub logout: String,
    pub refresh: String,
    pub session: String,
}

impl Default for AuthPaths {
    fn default() -> Self {
        Self {
            login: "/auth/login".into(),
            register: "/auth/register".into(),
            logout: "/auth/logout".into(),
            refresh: "/auth/refresh".into(),
            session: "/auth/me".into(),
        }
    }
}

impl AuthPaths {
    /// Load paths from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            login: lookup("AUTH_LOGIN_PATH").unwrap_or(defaults.login),
            register: lookup("AUTH_REGISTER_PATH").unwrap_or(defaults.register),
            logout: lookup("AUTH_LOGOUT_PATH").unwrap_or(defaults.logout),
            refresh: lookup("AUTH_REFRESH_PATH").unwrap_or(defaults.refresh),
            session: lookup("AUTH_SESSION_PATH").unwrap_or(defaults.session),
        }
    }

    /// Whether a request path must never participate in refresh logic.
    pub fn exempt(&self, path: &str) -> bool {
        path == self.login || path == self.logout || path == self.register || path == self.refresh
    }
}

/// Backend base URL from `API_URL`, defaulting to localhost.
pub fn api_url_from_env() -> String {
    std::env::var("API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_owned())
}
