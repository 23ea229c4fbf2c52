//! Error types for session operations

use api_client::ApiError;

/// Errors from the typed auth surface.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("api request failed: {0}")]
    Api(#[from] ApiError),

    #[error("unexpected response shape: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("http client construction failed: {0}")]
    Http(String),
}

impl Error {
    /// The structured API error, when this is a request failure.
    pub fn as_api_error(&self) -> Option<&ApiError> {
        match self {
            Error::Api(error) => Some(error),
            _ => None,
        }
    }
}

/// Result alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;
