//! Runtime configuration.
//!
//! Client settings come from the environment (`OPENALEX_ENDPOINT`,
//! `OPENALEX_API_KEY`, `OPENALEX_MAILTO`); crawl and feature settings have
//! defaults that the CLI overrides.

use crate::error::{Result, RppError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default OpenAlex API base URL
pub const DEFAULT_ENDPOINT: &str = "https://api.openalex.org";

/// Minimum gap between two outbound requests (polite pool allows 10 req/s)
pub const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(100);

/// Request timeout in seconds
pub const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Total attempts per request, including the first one
pub const MAX_ATTEMPTS: u32 = 3;

/// Settings for [`crate::client::RateLimitedClient`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API base URL without trailing slash
    pub endpoint: String,
    /// Optional API key, sent as the `api_key` query parameter
    pub api_key: Option<String>,
    /// Optional e-mail for the polite pool, sent as `mailto`
    pub mailto: Option<String>,
    pub min_interval: Duration,
    pub max_attempts: u32,
    /// Backoff before the second attempt; doubles after every failure
    pub backoff_base: Duration,
    /// Upper bound (exclusive) of the uniform jitter added to every wait
    pub max_jitter: Duration,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: None,
            mailto: None,
            min_interval: MIN_REQUEST_INTERVAL,
            max_attempts: MAX_ATTEMPTS,
            backoff_base: Duration::from_secs(1),
            max_jitter: Duration::from_millis(500),
            timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            user_agent: format!("rppnet/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    /// Build a config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(endpoint) = lookup("OPENALEX_ENDPOINT").filter(|s| !s.trim().is_empty()) {
            config.endpoint = endpoint.trim().trim_end_matches('/').to_string();
        }
        config.api_key = lookup("OPENALEX_API_KEY").filter(|s| !s.trim().is_empty());
        config.mailto = lookup("OPENALEX_MAILTO").filter(|s| !s.trim().is_empty());

        if let Some(mailto) = &config.mailto {
            config.user_agent = format!("{} (mailto:{})", config.user_agent, mailto);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the client cannot work with.
    pub fn validate(&self) -> Result<()> {
        if url::Url::parse(&self.endpoint).is_err() {
            return Err(RppError::Config(format!(
                "Invalid API endpoint: {}",
                self.endpoint
            )));
        }
        if self.max_attempts == 0 {
            return Err(RppError::Config("max_attempts must be at least 1".into()));
        }
        Ok(())
    }
}

/// Options for a single crawl
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Papers published after this year are pruned
    pub cutoff_year: i32,
    /// Nodes at this depth are recorded but not expanded
    pub max_depth: usize,
    /// Node budget
    pub max_nodes: usize,
    /// Maximum in-flight fetches
    pub concurrency: usize,
    /// Cancels the crawl; whatever was recorded so far is returned
    pub cancel: CancellationToken,
}

impl CrawlOptions {
    pub fn new(cutoff_year: i32) -> Self {
        Self {
            cutoff_year,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(RppError::Validation("concurrency must be at least 1".into()));
        }
        if self.max_nodes == 0 {
            return Err(RppError::Validation("max_nodes must be at least 1".into()));
        }
        Ok(())
    }
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            cutoff_year: i32::MAX,
            max_depth: 2,
            max_nodes: 1_000,
            concurrency: 32,
            cancel: CancellationToken::new(),
        }
    }
}

/// Options for feature extraction
#[derive(Debug, Clone)]
pub struct FeatureOptions {
    /// Double-edge-swap attempts per edge when building the random reference
    pub swap_iterations: usize,
    /// Seed for the random reference graph; `None` draws from entropy
    pub seed: Option<u64>,
    /// Concurrent author citation-count lookups
    pub lookup_concurrency: usize,
}

impl Default for FeatureOptions {
    fn default() -> Self {
        Self {
            swap_iterations: 5,
            seed: None,
            lookup_concurrency: 8,
        }
    }
}
