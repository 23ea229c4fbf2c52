//! Structured API error type and backend error-body extraction
//!
//! Every failure surfaced by this crate is an `ApiError` — a non-2xx
//! response, a connectivity failure, or a timeout. Raw `reqwest::Error`
//! values are never leaked to callers.
//!
//! The backend shapes error bodies as `{code|errorCode, message|error}`
//! at the top level or nested one level under an `error` object. The
//! extraction helpers here check both layouts.

use std::time::Duration;

use serde_json::Value;

use crate::request::RequestContext;

/// Uniform error carried by every rejection.
///
/// `status` is the HTTP status, or 0 for transport-level failures
/// (connectivity, timeout, cancellation). `code` is the machine-readable
/// code extracted from the response body when present.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message} (status {status})")]
pub struct ApiError {
    pub status: u16,
    pub code: Option<String>,
    pub message: String,
    pub context: RequestContext,
    pub duration: Duration,
    /// Decoded error body: JSON when the response was JSON, otherwise
    /// the raw body text wrapped in a string value.
    pub payload: Option<Value>,
    pub request_id: Option<String>,
    pub server_timing: Option<String>,
}

impl ApiError {
    /// Code for connectivity failures and wrapped transport exceptions.
    pub const NETWORK_ERROR: &'static str = "network_error";

    /// Code for deadline/cancellation failures.
    pub const TIMEOUT: &'static str = "timeout";

    /// Build a transport-level error (status 0, no payload).
    pub fn transport(
        code: &str,
        message: impl Into<String>,
        context: RequestContext,
        duration: Duration,
    ) -> Self {
        Self {
            status: 0,
            code: Some(code.to_owned()),
            message: message.into(),
            context,
            duration,
            payload: None,
            request_id: None,
            server_timing: None,
        }
    }

    /// The error code trimmed and lowercased, for case-insensitive
    /// comparison against backend codes like `token_expired`.
    pub fn normalized_code(&self) -> Option<String> {
        self.code
            .as_ref()
            .map(|code| code.trim().to_ascii_lowercase())
    }

    /// Whether this error was produced by the timeout/cancellation path.
    pub fn is_timeout(&self) -> bool {
        self.code.as_deref() == Some(Self::TIMEOUT)
    }
}

fn string_field<'a>(payload: &'a Value, field: &str) -> Option<&'a str> {
    payload.as_object()?.get(field)?.as_str()
}

fn object_field<'a>(payload: &'a Value, field: &str) -> Option<&'a Value> {
    let value = payload.as_object()?.get(field)?;
    value.is_object().then_some(value)
}

/// Extract the machine-readable code from an error body.
///
/// Checks top-level `code` then `errorCode`, then the same fields one
/// level under an `error` object.
pub(crate) fn extract_error_code(payload: &Value) -> Option<String> {
    if let Some(code) =
        string_field(payload, "code").or_else(|| string_field(payload, "errorCode"))
    {
        return Some(code.to_owned());
    }

    let nested = object_field(payload, "error")?;
    string_field(nested, "code")
        .or_else(|| string_field(nested, "errorCode"))
        .map(str::to_owned)
}

/// Extract the human-readable message from an error body.
///
/// Checks top-level `message` then a string-valued `error`, then the
/// same fields one level under an `error` object.
pub(crate) fn extract_error_message(payload: &Value) -> Option<String> {
    if let Some(message) =
        string_field(payload, "message").or_else(|| string_field(payload, "error"))
    {
        return Some(message.to_owned());
    }

    let nested = object_field(payload, "error")?;
    string_field(nested, "message")
        .or_else(|| string_field(nested, "error"))
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_context() -> RequestContext {
        RequestContext {
            attempt: 0,
            method: reqwest::Method::GET,
            path: "/profile".into(),
            skip_auth_refresh: false,
            url: "http://localhost:3000/profile".into(),
        }
    }

    #[test]
    fn extracts_top_level_code() {
        let payload = json!({"code": "token_expired", "message": "expired"});
        assert_eq!(extract_error_code(&payload).as_deref(), Some("token_expired"));
    }

    #[test]
    fn extracts_error_code_alias() {
        let payload = json!({"errorCode": "rate_limited"});
        assert_eq!(extract_error_code(&payload).as_deref(), Some("rate_limited"));
    }

    #[test]
    fn extracts_nested_code() {
        let payload = json!({"error": {"code": "TOKEN_EXPIRED", "message": "Access token expired"}});
        assert_eq!(extract_error_code(&payload).as_deref(), Some("TOKEN_EXPIRED"));
        assert_eq!(
            extract_error_message(&payload).as_deref(),
            Some("Access token expired")
        );
    }

    #[test]
    fn top_level_code_wins_over_nested() {
        let payload = json!({"code": "outer", "error": {"code": "inner"}});
        assert_eq!(extract_error_code(&payload).as_deref(), Some("outer"));
    }

    #[test]
    fn string_error_field_is_a_message_not_a_code() {
        let payload = json!({"error": "something broke"});
        assert_eq!(extract_error_code(&payload), None);
        assert_eq!(
            extract_error_message(&payload).as_deref(),
            Some("something broke")
        );
    }

    #[test]
    fn non_object_payload_extracts_nothing() {
        assert_eq!(extract_error_code(&json!("oops")), None);
        assert_eq!(extract_error_message(&json!(42)), None);
        assert_eq!(extract_error_code(&Value::Null), None);
    }

    #[test]
    fn non_string_fields_are_ignored() {
        let payload = json!({"code": 42, "message": {"text": "nope"}});
        assert_eq!(extract_error_code(&payload), None);
        assert_eq!(extract_error_message(&payload), None);
    }

    #[test]
    fn normalized_code_trims_and_lowercases() {
        let error = ApiError {
            status: 401,
            code: Some("  TOKEN_EXPIRED ".into()),
            message: "expired".into(),
            context: test_context(),
            duration: Duration::from_millis(12),
            payload: None,
            request_id: None,
            server_timing: None,
        };
        assert_eq!(error.normalized_code().as_deref(), Some("token_expired"));
    }

    #[test]
    fn display_includes_message_and_status() {
        let error = ApiError::transport(
            ApiError::TIMEOUT,
            "request timed out after 50ms",
            test_context(),
            Duration::from_millis(51),
        );
        assert_eq!(error.to_string(), "request timed out after 50ms (status 0)");
        assert!(error.is_timeout());
    }
}
