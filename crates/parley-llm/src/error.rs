//! Error types for completion requests.

use parley_core::error::ParleyError;

/// Errors from a completion service.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("HTTP request failed: {0}")]
    Http(String),
    #[error("completion endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed completion response: {0}")]
    Malformed(String),
    #[error("API key not set (expected in ${0})")]
    MissingApiKey(String),
    #[error("completion request timed out")]
    Timeout,
}

impl From<reqwest::Error> for CompletionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CompletionError::Timeout
        } else if err.is_decode() {
            CompletionError::Malformed(err.to_string())
        } else {
            CompletionError::Http(err.to_string())
        }
    }
}

impl From<CompletionError> for ParleyError {
    fn from(err: CompletionError) -> Self {
        ParleyError::Generation(err.to_string())
    }
}
