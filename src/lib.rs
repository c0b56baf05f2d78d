//! # rppnet
//!
//! Citation ego-network crawler and graph feature extractor.
//!
//! ## Modules
//!
//! - [`client`] - Rate-limited HTTP client with retry and backoff
//! - [`openalex`] - OpenAlex work and author lookups
//! - [`crawler`] - Bounded breadth-first crawl around a root paper
//! - [`network`] - Crawl output data model
//! - [`graph`] - Citation, ego and author graph views
//! - [`metrics`] - Graph metric primitives
//! - [`features`] - Feature vector extraction
//! - [`batch`] - Chunk split / run / merge pipeline
//! - [`config`] - Runtime configuration
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rppnet::{client::RateLimitedClient, config::*, crawler, features};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = RateLimitedClient::new(ClientConfig::from_env()?)?;
//!     let network = crawler::crawl(&client, "10.1037/0022-3514.90.5.751", &CrawlOptions::new(2008)).await?;
//!     let row = features::extract(&client, &network, &network.root_id, &FeatureOptions::default()).await?;
//!     println!("{}", serde_json::to_string(&row)?);
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod client;
pub mod config;
pub mod crawler;
pub mod error;
pub mod features;
pub mod graph;
pub mod metrics;
pub mod network;
pub mod openalex;

#[cfg(test)]
mod test_support;

pub use error::{Result, RppError};
