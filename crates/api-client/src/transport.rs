//! Single HTTP exchange
//!
//! Performs exactly one network round trip for a request context:
//! merges headers, encodes the body, applies the merged
//! timeout/cancellation deadline, parses the response per parse mode,
//! and classifies every failure into an [`ApiError`]. Owns no
//! authentication policy and mutates no shared state.

use std::time::{Duration, Instant};

use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde::de::Error as _;
use serde_json::Value;
use tracing::debug;

use crate::error::{ApiError, extract_error_code, extract_error_message};
use crate::request::{ParseMode, RequestBody, RequestContext, RequestOptions};

/// Parsed success value, shaped by the request's [`ParseMode`].
#[derive(Debug)]
pub enum ResponseValue {
    Json(Value),
    Text(String),
    /// `Void` parse mode or an HTTP 204 response.
    Empty,
    /// The unparsed response (`Raw` parse mode).
    Raw(reqwest::Response),
}

impl ResponseValue {
    /// Deserialize the value into a concrete type.
    ///
    /// `Json` deserializes the parsed value, `Text` parses the body
    /// text as JSON, and `Empty` deserializes from `null` (useful for
    /// `()` and `Option<T>`). `Raw` responses cannot be decoded.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        match self {
            ResponseValue::Json(value) => serde_json::from_value(value),
            ResponseValue::Text(text) => serde_json::from_str(&text),
            ResponseValue::Empty => serde_json::from_value(Value::Null),
            ResponseValue::Raw(_) => Err(serde_json::Error::custom(
                "raw responses must be consumed directly",
            )),
        }
    }
}

fn is_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.to_ascii_lowercase().contains("application/json"))
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)?
        .to_str()
        .ok()
        .map(str::to_owned)
}

/// Perform one exchange for the given context.
///
/// Caller headers override `default_headers`; `Accept:
/// application/json` is added when absent. The internal timeout
/// (request override, else `default_timeout_ms`, 0 disables) and any
/// external cancellation token are merged: whichever fires first aborts
/// the attempt with code `timeout`, status 0.
pub(crate) async fn send_once(
    http: &reqwest::Client,
    default_headers: &HeaderMap,
    default_timeout_ms: u64,
    context: &RequestContext,
    options: &RequestOptions,
) -> Result<ResponseValue, ApiError> {
    let started = Instant::now();

    let mut headers = default_headers.clone();
    for (name, value) in options.headers.iter() {
        headers.insert(name, value.clone());
    }
    if !headers.contains_key(ACCEPT) {
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    }

    let mut request = http.request(context.method.clone(), context.url.as_str());
    match &options.body {
        None => {}
        Some(RequestBody::Json(value)) => {
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            }
            let encoded = serde_json::to_vec(value).map_err(|e| {
                ApiError::transport(
                    ApiError::NETWORK_ERROR,
                    format!("failed to encode request body: {e}"),
                    context.clone(),
                    started.elapsed(),
                )
            })?;
            request = request.body(encoded);
        }
        Some(RequestBody::Text(text)) => {
            request = request.body(text.clone());
        }
        Some(RequestBody::Bytes(bytes)) => {
            request = request.body(bytes.clone());
        }
        Some(RequestBody::Form(fields)) => {
            request = request.form(fields);
        }
    }
    let request = request.headers(headers);

    let timeout_ms = options.timeout_ms.unwrap_or(default_timeout_ms);

    let deadline = async {
        if timeout_ms > 0 {
            tokio::time::sleep(Duration::from_millis(timeout_ms)).await;
        } else {
            std::future::pending::<()>().await;
        }
    };
    let cancel = options.cancel.clone();
    let cancelled = async {
        match cancel {
            Some(token) => token.cancelled_owned().await,
            None => std::future::pending::<()>().await,
        }
    };

    // The whole exchange, send through body read. Keeping it in one
    // future lets the deadline and cancellation arms below abort a
    // server that returns headers and then stalls the body.
    let exchange = async {
        let response = request.send().await.map_err(|e| {
            ApiError::transport(
                ApiError::NETWORK_ERROR,
                e.to_string(),
                context.clone(),
                started.elapsed(),
            )
        })?;

        let status = response.status();
        let request_id = header_str(response.headers(), "x-request-id");
        let server_timing = header_str(response.headers(), "server-timing");

        if !status.is_success() {
            let payload = read_error_payload(response).await;
            let code = payload.as_ref().and_then(extract_error_code);
            let message = payload
                .as_ref()
                .and_then(extract_error_message)
                .or_else(|| status.canonical_reason().map(str::to_owned))
                .unwrap_or_else(|| "request failed".to_owned());
            debug!(
                method = %context.method,
                path = %context.path,
                status = status.as_u16(),
                code = code.as_deref().unwrap_or(""),
                "api request failed"
            );
            return Err(ApiError {
                status: status.as_u16(),
                code,
                message,
                context: context.clone(),
                duration: started.elapsed(),
                payload,
                request_id,
                server_timing,
            });
        }

        parse_success(response, options.parse_as, context, started).await
    };

    // Internal deadline and external cancellation merge into the single
    // `timeout` code; callers cannot distinguish the two sources.
    tokio::select! {
        result = exchange => result,
        () = deadline => Err(ApiError::transport(
            ApiError::TIMEOUT,
            format!("request timed out after {timeout_ms}ms"),
            context.clone(),
            started.elapsed(),
        )),
        () = cancelled => Err(ApiError::transport(
            ApiError::TIMEOUT,
            "request cancelled".to_owned(),
            context.clone(),
            started.elapsed(),
        )),
    }
}

/// Decode a non-2xx body for error extraction.
///
/// 204 and empty bodies yield nothing; JSON bodies are parsed, other
/// bodies are kept as their raw text.
async fn read_error_payload(response: reqwest::Response) -> Option<Value> {
    if response.status() == StatusCode::NO_CONTENT {
        return None;
    }

    if is_json_content_type(response.headers()) {
        return response.json().await.ok();
    }

    let text = response.text().await.ok()?;
    (!text.is_empty()).then(|| Value::String(text))
}

async fn parse_success(
    response: reqwest::Response,
    parse_as: ParseMode,
    context: &RequestContext,
    started: Instant,
) -> Result<ResponseValue, ApiError> {
    if parse_as == ParseMode::Raw {
        return Ok(ResponseValue::Raw(response));
    }

    if parse_as == ParseMode::Void || response.status() == StatusCode::NO_CONTENT {
        return Ok(ResponseValue::Empty);
    }

    let wrap = |e: reqwest::Error, elapsed: Duration| {
        ApiError::transport(
            ApiError::NETWORK_ERROR,
            e.to_string(),
            context.clone(),
            elapsed,
        )
    };

    if parse_as == ParseMode::Text || !is_json_content_type(response.headers()) {
        let text = response
            .text()
            .await
            .map_err(|e| wrap(e, started.elapsed()))?;
        return Ok(ResponseValue::Text(text));
    }

    let value = response
        .json()
        .await
        .map_err(|e| wrap(e, started.elapsed()))?;
    Ok(ResponseValue::Json(value))
}
