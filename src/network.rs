//! Raw crawl output: papers, citation edges, authors and authorship edges.
//!
//! A [`Network`] is built once per root by the crawler and only read
//! afterwards. Edge endpoints that were pruned (cutoff year, depth, not
//! found, fetch failure) appear as citation targets but never as keys of
//! [`Network::nodes`]; they record "papers referenced but not expanded".

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One author on one paper
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Authorship {
    pub author_id: String,
    pub display_name: String,
    /// Institution ids in the order the API lists them; empty when unknown
    pub institutions: Vec<String>,
}

/// A fetched paper
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaperNode {
    /// DOI for the root, normalized OpenAlex id (or DOI) for references
    pub id: String,
    /// 0 when the API does not report a year
    pub publication_year: i32,
    /// Outgoing reference ids, normalized, in API order
    pub references: Vec<String>,
    pub authorships: Vec<Authorship>,
}

/// One entry of an author's yearly citation series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearCount {
    pub year: i32,
    #[serde(default)]
    pub cited_by_count: u64,
}

/// Author metadata; the first authorship seen for an id wins
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorRecord {
    pub id: String,
    pub display_name: String,
    pub institutions: Vec<String>,
    /// Populated lazily by lookups, absent in crawl output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counts_by_year: Option<Vec<YearCount>>,
}

impl From<&Authorship> for AuthorRecord {
    fn from(authorship: &Authorship) -> Self {
        Self {
            id: authorship.author_id.clone(),
            display_name: authorship.display_name.clone(),
            institutions: authorship.institutions.clone(),
            counts_by_year: None,
        }
    }
}

/// Directed citation, citing → cited. Duplicates are kept.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CitationEdge {
    pub citing: String,
    pub cited: String,
}

/// One authorship occurrence. Duplicates are kept.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuthorEdge {
    pub author_id: String,
    pub paper_id: String,
}

/// Crawl output for one root
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Network {
    pub root_id: String,
    pub nodes: HashMap<String, PaperNode>,
    pub edges: Vec<CitationEdge>,
    pub authors: HashMap<String, AuthorRecord>,
    pub author_edges: Vec<AuthorEdge>,
    /// Root metadata; `None` if the root was pruned or not found
    pub root: Option<PaperNode>,
}

impl Network {
    pub fn new(root_id: impl Into<String>) -> Self {
        Self {
            root_id: root_id.into(),
            ..Default::default()
        }
    }

    /// Store a fetched paper together with its authors and authorship edges.
    ///
    /// A paper id already present is left untouched.
    pub fn record_paper(&mut self, node: PaperNode) {
        if self.nodes.contains_key(&node.id) {
            return;
        }

        for authorship in &node.authorships {
            self.authors
                .entry(authorship.author_id.clone())
                .or_insert_with(|| AuthorRecord::from(authorship));
            self.author_edges.push(AuthorEdge {
                author_id: authorship.author_id.clone(),
                paper_id: node.id.clone(),
            });
        }

        self.nodes.insert(node.id.clone(), node);
    }

    pub fn record_citation(&mut self, citing: &str, cited: &str) {
        self.edges.push(CitationEdge {
            citing: citing.to_string(),
            cited: cited.to_string(),
        });
    }

    /// Fill in the root metadata once crawling is done.
    pub fn finish(mut self) -> Self {
        self.root = self.nodes.get(&self.root_id).cloned();
        self
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn has_root(&self) -> bool {
        self.root.is_some()
    }

    /// Authors of a recorded paper, in authorship order.
    pub fn authors_of(&self, paper_id: &str) -> impl Iterator<Item = &str> {
        self.nodes
            .get(paper_id)
            .into_iter()
            .flat_map(|node| node.authorships.iter().map(|a| a.author_id.as_str()))
    }
}
