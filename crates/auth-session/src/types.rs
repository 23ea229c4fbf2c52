//! Wire types for the auth endpoints
//!
//! Field names follow the backend's camelCase JSON contract. Login and
//! register share the same response shape.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginPayload {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAccountPayload {
    pub name: String,
    pub region: String,
    pub content_language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterPayload {
    pub email: String,
    pub password: String,
    pub name: String,
    pub language: String,
    pub account: RegisterAccountPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub name: String,
}

/// Response body for both login and register.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    pub access_token: String,
    pub user: AuthUser,
}

/// Outcome of probing the session endpoint.
///
/// A 401 means no active session; any other failure leaves the state
/// unknown (the caller decides whether to treat that as logged out).
#[derive(Debug, Clone, PartialEq)]
pub enum AuthSession {
    Authenticated(serde_json::Value),
    Unauthenticated,
    Unknown,
}
