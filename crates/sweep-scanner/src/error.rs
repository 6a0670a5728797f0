//! Error types for registry fetching and refinement.

use sweep_core::SearchKey;
use sweep_store::StoreError;
use thiserror::Error;

/// Errors raised while fetching or refining keys.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum ScanError {
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    #[error("rate limited by registry (HTTP 429)")]
    RateLimited,

    #[error("registry returned HTTP {0}")]
    HttpStatus(u16),

    #[error("unparseable payload for {key}: {message}")]
    UnparseablePayload { key: SearchKey, message: String },

    #[error("giving up on {key} after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded {
        key: SearchKey,
        attempts: u32,
        last_error: String,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("HTTP client setup failed: {0}")]
    Client(String),
}

impl ScanError {
    /// Whether the failed attempt should be retried after a backoff delay.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransientNetwork(_) | Self::RateLimited | Self::HttpStatus(_)
        )
    }

    /// Whether the error must abort the whole run.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Client(_))
    }
}

/// Result type alias for scanner operations.
pub type Result<T> = std::result::Result<T, ScanError>;
