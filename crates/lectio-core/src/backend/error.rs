//! Store-boundary error types

use thiserror::Error;

/// Errors surfaced by remote store implementations
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transport-level failure (connect, timeout, TLS)
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Backend answered with a non-success status
    #[error("backend returned {status}: {message}")]
    Api { status: u16, message: String },

    /// Response body did not match the expected shape
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Operation requires configuration that is not present
    #[error("not configured: {0}")]
    NotConfigured(String),

    /// Operation requires an authenticated session
    #[error("not authenticated")]
    NotAuthenticated,
}

impl StoreError {
    /// Build an API error from a status code and message body
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        StoreError::Api {
            status,
            message: message.into(),
        }
    }
}
