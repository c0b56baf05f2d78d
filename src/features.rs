//! Feature extraction: reduce a crawled [`Network`] to one flat record.
//!
//! Structural metrics come from the citation graph and its undirected ego
//! view; homophily metrics come from the author graph, enriched with one
//! time-sliced citation-count lookup per author. Undefined metrics are
//! `None` and serialize as explicit nulls.

use crate::client::RateLimitedClient;
use crate::config::FeatureOptions;
use crate::error::{Result, RppError};
use crate::graph::{AuthorGraph, CitationGraph};
use crate::metrics::{self, Adjacency};
use crate::network::{Network, YearCount};
use crate::openalex;
use futures::stream::{self, StreamExt};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Feature record for one root paper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub doi: String,
    pub n_nodes: usize,
    pub in_deg: usize,
    pub out_deg: usize,
    pub clust_coef: f64,
    pub betweenness: f64,
    pub modularity: Option<f64>,
    pub sigma_sw: Option<f64>,
    pub gini: f64,
    pub assort_inst: Option<f64>,
    pub assort_citation: Option<f64>,
    pub pbi_mean: Option<f64>,
    pub n_authors: usize,
    pub root_same_inst_frac: Option<f64>,
}

/// Citation count of the first entry (in series order) whose year is at
/// least `cutoff`, or 0 if there is none.
pub fn time_sliced_count(series: &[YearCount], cutoff: i32) -> u64 {
    series
        .iter()
        .find(|entry| entry.year >= cutoff)
        .map_or(0, |entry| entry.cited_by_count)
}

/// Look up the time-sliced citation count of every author in `authors`.
///
/// Each author is sliced at the year of the first paper they were seen on.
/// Failed lookups are logged and left out of the map, so those authors
/// count as unknown.
pub async fn lookup_citation_counts(
    client: &RateLimitedClient,
    authors: &AuthorGraph,
    options: &FeatureOptions,
) -> HashMap<String, u64> {
    let requests: Vec<(String, i32)> = authors
        .vertices()
        .map(|v| (v.id.clone(), v.first_year))
        .collect();
    let total = requests.len();

    let results: Vec<(String, Result<u64>)> = stream::iter(requests)
        .map(|(id, cutoff)| async move {
            let count = openalex::fetch_author_counts(client, &id)
                .await
                .map(|series| time_sliced_count(&series, cutoff));
            (id, count)
        })
        .buffer_unordered(options.lookup_concurrency.max(1))
        .collect()
        .await;

    let mut counts = HashMap::with_capacity(total);
    for (id, result) in results {
        match result {
            Ok(count) => {
                counts.insert(id, count);
            }
            Err(e) => warn!(author = %id, error = %e, "Author citation lookup failed"),
        }
    }

    debug!(authors = total, resolved = counts.len(), "Author citation lookups done");
    counts
}

/// Compute every feature from a network and already looked-up citation counts.
///
/// Fails with [`RppError::RootMissing`] if `root_id` is not a recorded paper.
pub fn compute_features(
    network: &Network,
    root_id: &str,
    citation_counts: &HashMap<String, u64>,
    options: &FeatureOptions,
) -> Result<FeatureVector> {
    let citation = CitationGraph::from_network(network);
    let ego = citation
        .ego_graph(root_id)
        .ok_or_else(|| RppError::RootMissing(root_id.to_string()))?;

    let adj = Adjacency::from_graph(&ego.graph);
    let root = ego.root.index();

    let betweenness = metrics::betweenness_centrality(&adj);
    let communities = metrics::greedy_modularity_communities(&adj);

    let mut rng = match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let sigma_sw = metrics::small_world_sigma(&adj, options.swap_iterations, &mut rng);

    let mut authors = AuthorGraph::from_network(network);
    authors.set_citation_counts(citation_counts);

    Ok(FeatureVector {
        doi: root_id.to_string(),
        n_nodes: ego.node_count(),
        in_deg: citation.in_degree(root_id),
        out_deg: citation.out_degree(root_id),
        clust_coef: metrics::local_clustering(&adj, root),
        betweenness: betweenness.get(root).copied().unwrap_or(0.0),
        modularity: metrics::modularity(&adj, &communities),
        sigma_sw,
        gini: metrics::gini(&authors.weighted_out_degrees()),
        assort_inst: institution_assortativity(&authors),
        assort_citation: citation_assortativity(&authors),
        pbi_mean: prestige_bias(&authors),
        n_authors: authors.node_count(),
        root_same_inst_frac: root_same_institution_fraction(network, root_id, &authors),
    })
}

/// Crawl-independent half of the pipeline: author lookups, then metrics.
pub async fn extract(
    client: &RateLimitedClient,
    network: &Network,
    root_id: &str,
    options: &FeatureOptions,
) -> Result<FeatureVector> {
    let root_id = openalex::normalize_id(root_id);
    if !network.nodes.contains_key(&root_id) {
        return Err(RppError::RootMissing(root_id));
    }

    let authors = AuthorGraph::from_network(network);
    let counts = lookup_citation_counts(client, &authors, options).await;

    let features = compute_features(network, &root_id, &counts, options)?;
    info!(
        root = %root_id,
        n_nodes = features.n_nodes,
        n_authors = features.n_authors,
        "Extracted features"
    );
    Ok(features)
}

fn institution_assortativity(authors: &AuthorGraph) -> Option<f64> {
    let qualifying = authors
        .vertices()
        .filter(|v| v.first_institution().is_some())
        .count();
    if qualifying < 2 {
        return None;
    }

    metrics::attribute_assortativity(authors.weighted_edges().filter_map(|(source, target, w)| {
        Some((source.first_institution()?, target.first_institution()?, w))
    }))
}

fn citation_assortativity(authors: &AuthorGraph) -> Option<f64> {
    let qualifying = authors
        .vertices()
        .filter(|v| v.citation_count.is_some())
        .count();
    if qualifying < 2 {
        return None;
    }

    metrics::numeric_assortativity(authors.weighted_edges().filter_map(|(source, target, w)| {
        Some((source.citation_count?, target.citation_count?, w))
    }))
}

/// (mean count of cited authors − mean count of all authors) / stdev of all.
fn prestige_bias(authors: &AuthorGraph) -> Option<f64> {
    let all: Vec<f64> = authors.vertices().filter_map(|v| v.citation_count).collect();
    if all.len() < 2 {
        return None;
    }
    let sd = metrics::population_std(&all)?;
    if sd <= 0.0 {
        return None;
    }

    let cited: Vec<f64> = authors.cited_authors().filter_map(|v| v.citation_count).collect();
    let Some(cited_mean) = metrics::mean(&cited) else {
        return Some(0.0);
    };
    let overall = metrics::mean(&all)?;

    Some((cited_mean - overall) / sd)
}

/// Share of the root authors' author-graph neighbours whose first
/// institution matches the root author's.
fn root_same_institution_fraction(
    network: &Network,
    root_id: &str,
    authors: &AuthorGraph,
) -> Option<f64> {
    let mut seen = HashSet::new();
    let mut total = 0usize;
    let mut same = 0usize;

    for author_id in network.authors_of(root_id) {
        if !seen.insert(author_id) {
            continue;
        }
        let Some(author) = authors.get(author_id) else {
            continue;
        };
        let institution = author.first_institution();
        for neighbor in authors.neighbors(author_id) {
            total += 1;
            if institution.is_some() && neighbor.first_institution() == institution {
                same += 1;
            }
        }
    }

    (total > 0).then(|| same as f64 / total as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CrawlOptions;
    use crate::crawler::crawl;
    use crate::network::{Authorship, PaperNode};
    use crate::test_support::{MockApi, MockReply};

    fn paper(id: &str, year: i32, authors: &[(&str, &str)]) -> PaperNode {
        PaperNode {
            id: id.to_string(),
            publication_year: year,
            references: Vec::new(),
            authorships: authors
                .iter()
                .map(|(author, institution)| Authorship {
                    author_id: author.to_string(),
                    display_name: author.to_string(),
                    institutions: if institution.is_empty() {
                        Vec::new()
                    } else {
                        vec![institution.to_string()]
                    },
                })
                .collect(),
        }
    }

    fn network(papers: Vec<PaperNode>, citations: &[(&str, &str)]) -> Network {
        let root = papers[0].id.clone();
        let mut network = Network::new(root);
        for p in papers {
            network.record_paper(p);
        }
        for (citing, cited) in citations {
            network.record_citation(citing, cited);
        }
        network.finish()
    }

    fn seeded() -> FeatureOptions {
        FeatureOptions {
            seed: Some(42),
            ..Default::default()
        }
    }

    fn counts(pairs: &[(&str, u64)]) -> HashMap<String, u64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_time_sliced_count_takes_first_match() {
        let series = vec![
            YearCount { year: 2023, cited_by_count: 40 },
            YearCount { year: 2012, cited_by_count: 7 },
            YearCount { year: 2008, cited_by_count: 3 },
        ];
        assert_eq!(time_sliced_count(&series, 2010), 40);
        assert_eq!(time_sliced_count(&series, 2024), 0);
        assert_eq!(time_sliced_count(&[], 2000), 0);
    }

    #[test]
    fn test_prestige_bias_worked_example() {
        // A1 (10) and A2 (20) cite A3 (30); only A3 is cited
        let net = network(
            vec![
                paper("R", 2010, &[("A1", ""), ("A2", "")]),
                paper("P", 2005, &[("A3", "")]),
            ],
            &[("R", "P")],
        );
        let features =
            compute_features(&net, "R", &counts(&[("A1", 10), ("A2", 20), ("A3", 30)]), &seeded())
                .unwrap();

        let pbi = features.pbi_mean.unwrap();
        assert!((pbi - 10.0 / 8.164_965_809).abs() < 1e-6);
        assert!((pbi - 1.2247).abs() < 1e-4);
    }

    #[test]
    fn test_prestige_bias_without_citations_is_zero() {
        let net = network(vec![paper("R", 2010, &[("A1", ""), ("A2", "")])], &[]);
        let features =
            compute_features(&net, "R", &counts(&[("A1", 1), ("A2", 5)]), &seeded()).unwrap();
        assert_eq!(features.pbi_mean, Some(0.0));
    }

    #[test]
    fn test_prestige_bias_undefined_with_unknown_counts() {
        let net = network(
            vec![paper("R", 2010, &[("A1", "")]), paper("P", 2005, &[("A2", "")])],
            &[("R", "P")],
        );
        let features = compute_features(&net, "R", &counts(&[("A2", 4)]), &seeded()).unwrap();
        assert_eq!(features.pbi_mean, None);
        assert_eq!(features.assort_citation, None);

        let equal = compute_features(&net, "R", &counts(&[("A1", 4), ("A2", 4)]), &seeded()).unwrap();
        assert_eq!(equal.pbi_mean, None);
    }

    #[test]
    fn test_pruned_reference_is_outside_ego() {
        let net = network(
            vec![paper("10.1000/x", 2009, &[]), paper("10.1000/a", 2005, &[])],
            &[("10.1000/x", "10.1000/a"), ("10.1000/x", "10.1000/b")],
        );
        let features = compute_features(&net, "10.1000/x", &HashMap::new(), &seeded()).unwrap();

        assert_eq!(features.n_nodes, 2);
        assert_eq!(features.out_deg, 2);
        assert_eq!(features.in_deg, 0);
        assert_eq!(features.clust_coef, 0.0);
        assert_eq!(features.sigma_sw, None);
        assert_eq!(features.n_authors, 0);
        assert_eq!(features.gini, 0.0);
        assert_eq!(features.root_same_inst_frac, None);
    }

    #[test]
    fn test_single_institution_assortativity_is_null() {
        let net = network(
            vec![
                paper("R", 2010, &[("A1", "I1")]),
                paper("P", 2005, &[("A2", "I1")]),
            ],
            &[("R", "P")],
        );
        let features = compute_features(&net, "R", &HashMap::new(), &seeded()).unwrap();
        assert_eq!(features.assort_inst, None);
        assert_eq!(features.root_same_inst_frac, Some(1.0));
    }

    #[test]
    fn test_institution_assortativity_and_root_fraction() {
        // Same-institution citations dominate
        let net = network(
            vec![
                paper("R", 2010, &[("A1", "I1"), ("A2", "I2")]),
                paper("P", 2005, &[("A3", "I1")]),
                paper("Q", 2004, &[("A4", "I2")]),
            ],
            &[("R", "P"), ("R", "Q")],
        );
        let features = compute_features(&net, "R", &HashMap::new(), &seeded()).unwrap();

        let r = features.assort_inst.unwrap();
        assert!(r > -1.0 - 1e-9 && r < 1.0 + 1e-9);
        // A1 and A2 each neighbour A3 and A4; half share an institution
        assert_eq!(features.root_same_inst_frac, Some(0.5));
        assert_eq!(features.n_authors, 4);
    }

    #[test]
    fn test_structural_features_on_triangle() {
        let net = network(
            vec![paper("R", 2010, &[]), paper("P", 2005, &[]), paper("Q", 2004, &[])],
            &[("R", "P"), ("R", "Q"), ("P", "Q"), ("Q", "R")],
        );
        let features = compute_features(&net, "R", &HashMap::new(), &seeded()).unwrap();

        assert_eq!(features.n_nodes, 3);
        assert_eq!(features.in_deg, 1);
        assert_eq!(features.out_deg, 2);
        assert!((features.clust_coef - 1.0).abs() < 1e-12);
        assert_eq!(features.betweenness, 0.0);
        assert!(features.modularity.unwrap().abs() < 1e-12);
    }

    #[test]
    fn test_rootless_network_is_an_error() {
        let net = Network::new("10.1000/gone").finish();
        let result = compute_features(&net, "10.1000/gone", &HashMap::new(), &seeded());
        assert!(matches!(result, Err(RppError::RootMissing(_))));
    }

    #[test]
    fn test_features_serialize_nulls() {
        let net = network(vec![paper("R", 2010, &[])], &[]);
        let features = compute_features(&net, "R", &HashMap::new(), &seeded()).unwrap();
        let json = serde_json::to_value(&features).unwrap();
        assert!(json["modularity"].is_null());
        assert!(json["pbi_mean"].is_null());
        assert_eq!(json["doi"], "R");
    }

    #[tokio::test]
    async fn test_extract_against_api() {
        let api = MockApi::start().await;
        api.work("10.1000/x", 2009, &["https://doi.org/10.1000/a"], &[("A1", "I1"), ("A2", "I2")]);
        api.work("10.1000/a", 2005, &[], &[("A3", "I1")]);
        api.author_counts("A1", &[(2010, 10), (2009, 99)]);
        api.author_counts("A2", &[(2009, 20)]);
        api.author_counts("A3", &[(2005, 30)]);

        let client = api.client();
        let mut options = CrawlOptions::new(2010);
        options.max_depth = 1;
        let net = crawl(&client, "10.1000/x", &options).await.unwrap();

        let features = extract(&client, &net, "https://doi.org/10.1000/x", &seeded())
            .await
            .unwrap();

        assert_eq!(features.doi, "10.1000/x");
        assert_eq!(features.n_nodes, 2);
        assert_eq!(features.n_authors, 3);
        // A1 sliced at 2009 → 10, A2 → 20, A3 → 30; A3 is the cited one
        assert!((features.pbi_mean.unwrap() - 1.2247).abs() < 1e-4);
        assert_eq!(api.hits("/authors/A1"), 1);
    }

    #[tokio::test]
    async fn test_failed_lookup_leaves_count_unknown() {
        let api = MockApi::start().await;
        api.reply("/authors/A1", MockReply::Status(503));
        // A2 is first seen in 2005, so the 2000 entry is skipped
        api.author_counts("A2", &[(2000, 5), (2006, 9)]);

        let net = network(
            vec![paper("R", 2010, &[("A1", "")]), paper("P", 2005, &[("A2", "")])],
            &[("R", "P")],
        );
        let authors = AuthorGraph::from_network(&net);
        let counts = lookup_citation_counts(&api.client(), &authors, &seeded()).await;

        assert_eq!(counts.get("A2"), Some(&9));
        assert!(!counts.contains_key("A1"));
    }
}
