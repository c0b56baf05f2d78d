//! Bounded breadth-first crawl of the citation graph around a root paper.
//!
//! The task that calls [`crawl`] is the only writer of the frontier, the
//! visited set and the [`Network`] collections. Fetches run concurrently as
//! futures owned by that task; each one holds a semaphore permit, so at most
//! `concurrency` requests are in flight. Completions are applied one at a
//! time in completion order, which is why node and edge order is not
//! meaningful downstream.

use crate::client::RateLimitedClient;
use crate::config::CrawlOptions;
use crate::error::{Result, RppError};
use crate::network::{Network, PaperNode};
use crate::openalex;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Result of one dispatched fetch
struct FetchOutcome {
    id: String,
    depth: usize,
    result: Result<Option<PaperNode>>,
}

#[derive(Debug, Default)]
struct CrawlStats {
    fetched: usize,
    not_found: usize,
    after_cutoff: usize,
    failed: usize,
}

/// Coordinator-owned crawl state
struct CrawlState {
    network: Network,
    frontier: VecDeque<(String, usize)>,
    visited: HashSet<String>,
    stats: CrawlStats,
}

impl CrawlState {
    fn new(root_id: &str) -> Self {
        Self {
            network: Network::new(root_id),
            frontier: VecDeque::from([(root_id.to_string(), 0)]),
            visited: HashSet::new(),
            stats: CrawlStats::default(),
        }
    }

    /// Record one completed fetch.
    ///
    /// Only a failure of the root fetch itself is returned as an error;
    /// every other failure prunes the node.
    fn apply(&mut self, outcome: FetchOutcome, options: &CrawlOptions) -> Result<()> {
        let FetchOutcome { id, depth, result } = outcome;

        let paper = match result {
            Ok(Some(paper)) => paper,
            Ok(None) => {
                debug!(id = %id, depth = depth, "Not found, pruned");
                self.stats.not_found += 1;
                return Ok(());
            }
            Err(e) if id == self.network.root_id => return Err(e),
            Err(e) => {
                warn!(id = %id, depth = depth, error = %e, "Fetch failed, pruned");
                self.stats.failed += 1;
                return Ok(());
            }
        };

        self.stats.fetched += 1;

        if paper.publication_year > options.cutoff_year {
            debug!(
                id = %id,
                year = paper.publication_year,
                cutoff = options.cutoff_year,
                "Published after cutoff, pruned"
            );
            self.stats.after_cutoff += 1;
            return Ok(());
        }

        // Edges are recorded whether or not the cited paper is ever fetched
        if depth < options.max_depth {
            for reference in &paper.references {
                self.network.record_citation(&paper.id, reference);
                self.frontier.push_back((reference.clone(), depth + 1));
            }
        }

        self.network.record_paper(paper);
        Ok(())
    }
}

/// Crawl the ego network around `root_id`.
///
/// Traversal stops when the frontier is exhausted, the node budget is
/// reached, or `options.cancel` fires; fetches still in flight at that point
/// are dropped. A root that is not found or published after the cutoff
/// yields a network with `root == None`.
pub async fn crawl(
    client: &RateLimitedClient,
    root_id: &str,
    options: &CrawlOptions,
) -> Result<Network> {
    options.validate()?;

    let root_id = openalex::normalize_id(root_id);
    info!(
        root = %root_id,
        cutoff = options.cutoff_year,
        max_depth = options.max_depth,
        max_nodes = options.max_nodes,
        concurrency = options.concurrency,
        "Starting network crawl"
    );

    let semaphore = Arc::new(Semaphore::new(options.concurrency));
    let mut state = CrawlState::new(&root_id);
    let mut in_flight = FuturesUnordered::new();

    loop {
        if state.network.node_count() >= options.max_nodes {
            info!(nodes = state.network.node_count(), "Node budget reached");
            break;
        }

        // Dispatch while permits are free
        while let Some((id, depth)) = state.frontier.pop_front() {
            if state.visited.contains(&id) {
                continue;
            }
            let permit = match semaphore.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    state.frontier.push_front((id, depth));
                    break;
                }
            };
            state.visited.insert(id.clone());

            let client = client.clone();
            in_flight.push(async move {
                let _permit = permit;
                let result = openalex::fetch_work(&client, &id).await;
                FetchOutcome { id, depth, result }
            });
        }

        let outcome = tokio::select! {
            biased;
            _ = options.cancel.cancelled() => {
                warn!(root = %root_id, nodes = state.network.node_count(), "Crawl cancelled");
                return Err(RppError::Cancelled(root_id));
            }
            next = in_flight.next() => match next {
                Some(outcome) => outcome,
                None => break,
            },
        };

        state.apply(outcome, options)?;
    }

    let network = state.network.finish();
    info!(
        root = %root_id,
        nodes = network.node_count(),
        edges = network.edges.len(),
        authors = network.authors.len(),
        fetched = state.stats.fetched,
        not_found = state.stats.not_found,
        after_cutoff = state.stats.after_cutoff,
        failed = state.stats.failed,
        "Completed network crawl"
    );
    if !network.has_root() {
        warn!(root = %root_id, "Root not found in final network");
    }

    Ok(network)
}
