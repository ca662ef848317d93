//! DigitalOcean client errors

use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur when interacting with the DigitalOcean API
#[derive(Debug, Error)]
pub enum DigitalOceanError {
    /// HTTP transport error (connection refused, timeout, TLS, ...)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Token rejected (401/403)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Rate limit exceeded (429)
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Resource not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request rejected as invalid (400/422)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Temporary condition: server-side failure or resource not ready yet
    #[error("Transient error: {0}")]
    Transient(String),

    /// Any other unexpected API response
    #[error("DigitalOcean API error: {0}")]
    Api(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Token cannot be used to build a client
    #[error("Invalid token: {0}")]
    InvalidToken(String),
}

impl DigitalOceanError {
    /// Map a non-success HTTP status onto the error taxonomy
    pub(crate) fn from_status(status: StatusCode, context: &str, body: &str) -> Self {
        let msg = format!("{context}: {status} - {body}");
        match status.as_u16() {
            401 | 403 => Self::Unauthorized(msg),
            404 => Self::NotFound(msg),
            400 | 422 => Self::Validation(msg),
            429 => Self::RateLimited(msg),
            500..=599 => Self::Transient(msg),
            _ => Self::Api(msg),
        }
    }

    /// Whether the provider object is gone
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether retrying the same call later may succeed without user action
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Http(_) | Self::RateLimited(_) | Self::Transient(_))
    }
}
