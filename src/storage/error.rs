use std::time::Duration;

use thiserror::Error;

/// Errors from the object storage collaborator.
///
/// `is_retryable()` separates transient failures (throttling, server errors,
/// timeouts, dropped connections) from permanent ones so a single request
/// can be retried without masking configuration mistakes.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("HTTP error {status} for {key}")]
    HttpStatus { status: u16, key: String },

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Request for {key} timed out after {}s", timeout.as_secs())]
    Timeout { key: String, timeout: Duration },

    #[error("Transport error for {key}: {source}")]
    Transport {
        key: String,
        source: reqwest::Error,
    },

    #[error("Malformed listing response: {0}")]
    Xml(String),

    #[error("Invalid storage configuration: {0}")]
    Config(String),
}

impl StorageError {
    /// Whether this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            StorageError::Timeout { .. } | StorageError::Transport { .. } => true,
            StorageError::NotFound(_) | StorageError::Xml(_) | StorageError::Config(_) => false,
        }
    }
}
