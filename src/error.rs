//! Custom error types for rppnet.
//!
//! This module defines all error types used throughout the crate.
//! All functions return `Result<T, RppError>` instead of using `unwrap()`.
//!
//! Two outcomes that look like failures are deliberately *not* errors:
//! a 404 from the bibliographic API is `Ok(None)` (a pruning signal), and an
//! undefined metric is `None` in the feature record.

use thiserror::Error;

/// Main error type for rppnet operations.
#[derive(Debug, Error)]
pub enum RppError {
    /// HTTP client could not be constructed
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Timeout, connection reset or unexpected status; retried with backoff
    #[error("Transient error: {0}")]
    Transient(String),

    /// Rate limited by the API, retry after the given number of seconds
    #[error("Rate limited, retry after {0}s")]
    RateLimited(u64),

    /// Retry budget exhausted for a single request
    #[error("Fetch failed after {attempts} attempts for {url}: {reason}")]
    FetchFailed {
        /// Request URL
        url: String,
        /// Attempts made
        attempts: u32,
        /// Last failure observed
        reason: String,
    },

    /// Response body did not match the expected shape
    #[error("Parse error: {0}")]
    Parse(String),

    /// Feature extraction was asked for a root that is not in the network
    #[error("Root {0} is not part of the network")]
    RootMissing(String),

    /// Crawl stopped by its cancellation token before finishing
    #[error("Crawl of {0} was cancelled")]
    Cancelled(String),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV read/write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl RppError {
    /// Whether the request that produced this error may succeed if repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RppError::Transient(_) | RppError::RateLimited(_))
    }
}

/// Result type alias using `RppError`
pub type Result<T> = std::result::Result<T, RppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(RppError::Transient("timeout".into()).is_retryable());
        assert!(RppError::RateLimited(2).is_retryable());
        assert!(!RppError::RootMissing("10.1/x".into()).is_retryable());
        assert!(!RppError::FetchFailed {
            url: "http://x".into(),
            attempts: 3,
            reason: "boom".into(),
        }
        .is_retryable());
    }

    #[test]
    fn test_fetch_failed_message() {
        let err = RppError::FetchFailed {
            url: "http://api/works/W1".into(),
            attempts: 3,
            reason: "HTTP 503".into(),
        };
        assert_eq!(
            err.to_string(),
            "Fetch failed after 3 attempts for http://api/works/W1: HTTP 503"
        );
    }
}
