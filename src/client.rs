//! Rate-limited HTTP client for the bibliographic API.
//!
//! Every outbound request goes through one [`RateLimiter`] shared by all
//! clones of a [`RateLimitedClient`], so the minimum gap between requests
//! holds across every concurrent caller in the process.
//!
//! Retry policy per request:
//! - HTTP 404 → `Ok(None)`, never retried
//! - HTTP 429 → sleep `Retry-After` + jitter, then retry
//! - timeout / connection error / other status → exponential backoff + jitter
//! - at most `max_attempts` attempts in total, then [`RppError::FetchFailed`]

use crate::config::ClientConfig;
use crate::error::{Result, RppError};
use chrono::{DateTime, Utc};
use rand::Rng;
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;

/// Wait used when a 429 carries no usable `Retry-After` header
const DEFAULT_RETRY_AFTER_SECS: u64 = 1;

/// Enforces a minimum wall-clock gap between successive requests.
///
/// The lock is held across "read timestamp, sleep, write timestamp", so
/// concurrent callers are serialized and cannot interleave inside the gap.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    /// Wait until a request may be sent, then claim the slot.
    pub async fn wait(&self) {
        let mut last = self.last_call.lock().await;

        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }

        *last = Some(Instant::now());
    }
}

/// HTTP client honoring the shared rate limit and the retry policy.
///
/// Cheap to clone; clones share the connection pool and the limiter.
#[derive(Debug, Clone)]
pub struct RateLimitedClient {
    http: reqwest::Client,
    limiter: Arc<RateLimiter>,
    config: Arc<ClientConfig>,
}

impl RateLimitedClient {
    /// Create a client with its own rate limiter.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let limiter = Arc::new(RateLimiter::new(config.min_interval));
        Self::with_limiter(config, limiter)
    }

    /// Create a client that shares an existing rate limiter.
    pub fn with_limiter(config: ClientConfig, limiter: Arc<RateLimiter>) -> Result<Self> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            http,
            limiter,
            config: Arc::new(config),
        })
    }

    /// Build `{endpoint}{path}` with the API key and polite-pool e-mail attached.
    ///
    /// `path` must already be percent-encoded where needed.
    pub fn endpoint_url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        let raw = format!("{}{}", self.config.endpoint, path);
        let mut url = Url::parse(&raw)
            .map_err(|e| RppError::Validation(format!("Invalid URL {}: {}", raw, e)))?;

        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
            if let Some(mailto) = &self.config.mailto {
                pairs.append_pair("mailto", mailto);
            }
            if let Some(key) = &self.config.api_key {
                pairs.append_pair("api_key", key);
            }
        }

        // An empty `?` is left behind when nothing was appended
        if url.query() == Some("") {
            url.set_query(None);
        }

        Ok(url)
    }

    /// GET `url` and decode the JSON body.
    ///
    /// Returns `Ok(None)` on HTTP 404.
    pub async fn fetch_json<T: DeserializeOwned>(&self, url: &Url) -> Result<Option<T>> {
        let max_attempts = self.config.max_attempts;
        let mut backoff = self.config.backoff_base;
        let mut last_reason = String::new();

        for attempt in 1..=max_attempts {
            match self.attempt(url).await {
                Ok(body) => return Ok(body),
                Err(RppError::RateLimited(secs)) => {
                    last_reason = format!("rate limited (Retry-After {}s)", secs);
                    if attempt == max_attempts {
                        break;
                    }
                    let wait = Duration::from_secs(secs) + self.jitter();
                    warn!(
                        path = url.path(),
                        attempt = attempt,
                        wait_ms = wait.as_millis() as u64,
                        "Rate limited, waiting"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) if e.is_retryable() => {
                    last_reason = e.to_string();
                    if attempt == max_attempts {
                        break;
                    }
                    let wait = backoff + self.jitter();
                    debug!(
                        path = url.path(),
                        attempt = attempt,
                        error = %e,
                        wait_ms = wait.as_millis() as u64,
                        "Request failed, backing off"
                    );
                    tokio::time::sleep(wait).await;
                    backoff *= 2;
                }
                Err(e) => return Err(e),
            }
        }

        Err(RppError::FetchFailed {
            url: redact(url),
            attempts: max_attempts,
            reason: last_reason,
        })
    }

    /// One rate-limited request, classified into the error taxonomy.
    async fn attempt<T: DeserializeOwned>(&self, url: &Url) -> Result<Option<T>> {
        self.limiter.wait().await;

        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| RppError::Transient(describe(&e)))?;

        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            debug!(path = url.path(), "Not found");
            return Ok(None);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let secs = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| parse_retry_after(v, Utc::now()))
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return Err(RppError::RateLimited(secs));
        }

        if !status.is_success() {
            return Err(RppError::Transient(format!("HTTP {}", status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| RppError::Transient(describe(&e)))?;

        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| RppError::Parse(format!("Unexpected body from {}: {}", url.path(), e)))
    }

    /// Uniform jitter in `[0, max_jitter)`.
    fn jitter(&self) -> Duration {
        let fraction: f64 = rand::thread_rng().gen();
        self.config.max_jitter.mul_f64(fraction)
    }
}

/// Parse a `Retry-After` value: delay in seconds or an HTTP date.
///
/// Dates in the past yield 0.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<u64> {
    let value = value.trim();

    if let Ok(secs) = value.parse::<u64>() {
        return Some(secs);
    }

    let date = DateTime::parse_from_rfc2822(value).ok()?;
    let delta = date.with_timezone(&Utc) - now;
    Some(delta.num_seconds().max(0) as u64)
}

fn describe(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "request timed out".to_string()
    } else if error.is_connect() {
        format!("connection failed: {}", error)
    } else {
        error.to_string()
    }
}

/// URL without query string, so API keys never reach logs or errors.
fn redact(url: &Url) -> String {
    let mut clean = url.clone();
    clean.set_query(None);
    clean.to_string()
}
