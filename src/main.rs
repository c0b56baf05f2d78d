//! rppnet - citation ego-network features for replication studies
//!
//! ## Usage
//!
//! ### Single root
//! ```bash
//! rppnet crawl 10.1037/0022-3514.90.5.751 --cutoff 2008 --snapshot ./networks
//! ```
//!
//! ### Batch
//! ```bash
//! rppnet split data/targets.csv --n-chunks 100
//! rppnet run --chunk-id 7
//! rppnet merge --targets data/targets.csv
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rppnet::batch::{self, ChunkJob};
use rppnet::client::RateLimitedClient;
use rppnet::config::{ClientConfig, CrawlOptions, FeatureOptions};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Citation ego-network crawler and feature extractor
#[derive(Parser)]
#[command(name = "rppnet")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Crawl and feature settings shared by `crawl` and `run`
#[derive(Args, Clone)]
struct CrawlArgs {
    /// BFS depth
    #[arg(long, default_value = "2")]
    max_depth: usize,

    /// Node budget cap
    #[arg(long, default_value = "1000")]
    max_nodes: usize,

    /// Concurrent HTTP requests
    #[arg(long, default_value = "32")]
    n_concurrent: usize,

    /// Swap attempts per edge for the small-world reference graph
    #[arg(long, default_value = "5")]
    swap_iterations: usize,

    /// Seed for the small-world reference graph
    #[arg(long)]
    seed: Option<u64>,
}

impl CrawlArgs {
    fn crawl_options(&self, cutoff_year: i32, cancel: CancellationToken) -> CrawlOptions {
        CrawlOptions {
            cutoff_year,
            max_depth: self.max_depth,
            max_nodes: self.max_nodes,
            concurrency: self.n_concurrent,
            cancel,
        }
    }

    fn feature_options(&self) -> FeatureOptions {
        FeatureOptions {
            swap_iterations: self.swap_iterations,
            seed: self.seed,
            ..Default::default()
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl one root paper and print its feature record as JSON
    Crawl {
        /// DOI or OpenAlex id of the root paper
        doi: String,

        /// Papers published after this year are pruned
        #[arg(long)]
        cutoff: i32,

        /// Directory for the raw network snapshot
        #[arg(long)]
        snapshot: Option<PathBuf>,

        #[command(flatten)]
        crawl: CrawlArgs,
    },

    /// Process one chunk of target papers
    Run {
        /// Chunk number (00-99)
        #[arg(long)]
        chunk_id: u32,

        /// Directory holding chunk_XX.csv
        #[arg(long, default_value = "data/chunks")]
        chunks_dir: PathBuf,

        /// Directory for results_chunk_XX.csv
        #[arg(long, default_value = "data/features")]
        features_dir: PathBuf,

        /// Directory for raw network snapshots
        #[arg(long, default_value = "data/networks_raw")]
        networks_dir: PathBuf,

        /// Do not write raw network snapshots
        #[arg(long)]
        no_snapshots: bool,

        #[command(flatten)]
        crawl: CrawlArgs,
    },

    /// Deduplicate, shuffle and partition the target list into chunks
    Split {
        /// Target CSV with a `doi` column
        input: PathBuf,

        /// Number of chunks
        #[arg(long)]
        n_chunks: u32,

        /// Output directory
        #[arg(short, long, default_value = "data/chunks")]
        output: PathBuf,

        /// Shuffle seed
        #[arg(long, default_value_t = batch::DEFAULT_SPLIT_SEED)]
        seed: u64,
    },

    /// Concatenate chunk results and left-join them onto the targets
    Merge {
        /// Directory holding results_chunk_XX.csv
        #[arg(long, default_value = "data/features")]
        features_dir: PathBuf,

        /// Target CSV with a `doi` column
        #[arg(long, default_value = "data/rpp_targets.csv")]
        targets: PathBuf,

        /// Output CSV
        #[arg(short, long, default_value = "data/master_features.csv")]
        output: PathBuf,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    if cli.log_json {
        fmt().json().with_env_filter(filter).with_target(true).init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .init();
    }

    match cli.command {
        Commands::Crawl {
            doi,
            cutoff,
            snapshot,
            crawl,
        } => run_single(doi, cutoff, snapshot, crawl).await,
        Commands::Run {
            chunk_id,
            chunks_dir,
            features_dir,
            networks_dir,
            no_snapshots,
            crawl,
        } => {
            let job = ChunkJob {
                chunk_id,
                chunks_dir,
                features_dir,
                networks_dir: (!no_snapshots).then_some(networks_dir),
                crawl: crawl.crawl_options(0, shutdown_token()),
                features: crawl.feature_options(),
            };
            run_chunk(job).await
        }
        Commands::Split {
            input,
            n_chunks,
            output,
            seed,
        } => {
            let paths = batch::split_targets(&input, &output, n_chunks, seed)
                .with_context(|| format!("Failed to split {}", input.display()))?;
            println!("Wrote {} chunks to {}", paths.len(), output.display());
            Ok(())
        }
        Commands::Merge {
            features_dir,
            targets,
            output,
        } => {
            let summary = batch::merge_results(&features_dir, &targets, &output)
                .context("Failed to merge results")?;
            println!(
                "Wrote {} ({} of {} targets with features)",
                output.display(),
                summary.matched,
                summary.targets
            );
            Ok(())
        }
    }
}

fn build_client() -> Result<RateLimitedClient> {
    let config = ClientConfig::from_env().context("Invalid API configuration")?;
    RateLimitedClient::new(config).context("Failed to build HTTP client")
}

/// Token cancelled on Ctrl-C; an interrupted crawl fails instead of yielding a partial network.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping crawl");
            trigger.cancel();
        }
    });
    token
}

// ============================================================================
// Commands
// ============================================================================

async fn run_single(
    doi: String,
    cutoff: i32,
    snapshot: Option<PathBuf>,
    args: CrawlArgs,
) -> Result<()> {
    let client = build_client()?;
    let crawl_options = args.crawl_options(cutoff, shutdown_token());

    let features = batch::process_root(
        &client,
        &doi,
        &crawl_options,
        &args.feature_options(),
        snapshot.as_deref(),
    )
    .await
    .with_context(|| format!("Failed to process {}", doi))?;

    println!("{}", serde_json::to_string_pretty(&features)?);
    Ok(())
}

async fn run_chunk(job: ChunkJob) -> Result<()> {
    let client = build_client()?;
    let summary = batch::run_chunk(&client, &job)
        .await
        .with_context(|| format!("Failed to run chunk {:02}", job.chunk_id))?;

    info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        skipped = summary.skipped,
        "Chunk finished"
    );
    Ok(())
}
