//! Graph views over a crawled [`Network`].
//!
//! - [`CitationGraph`]: directed paper graph. Recorded papers plus stub
//!   vertices for pruned citation targets, parallel edges and self-loops kept.
//! - [`EgoGraph`]: simple undirected view of the recorded papers reachable
//!   from the root.
//! - [`AuthorGraph`]: author → author edges for every citation, weighted by
//!   how many times the pair occurs.

use crate::network::Network;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{HashMap, HashSet, VecDeque};

/// Vertex of the citation graph
#[derive(Debug, Clone)]
pub struct PaperVertex {
    pub id: String,
    /// `false` for stubs: cited but never recorded
    pub recorded: bool,
}

/// Directed citation graph
#[derive(Debug, Clone)]
pub struct CitationGraph {
    graph: DiGraph<PaperVertex, ()>,
    index: HashMap<String, NodeIndex>,
}

impl CitationGraph {
    pub fn from_network(network: &Network) -> Self {
        let mut citation = Self {
            graph: DiGraph::new(),
            index: HashMap::new(),
        };

        let mut ids: Vec<&String> = network.nodes.keys().collect();
        ids.sort();
        for id in ids {
            citation.vertex(id, true);
        }

        for edge in &network.edges {
            let from = citation.vertex(&edge.citing, false);
            let to = citation.vertex(&edge.cited, false);
            citation.graph.add_edge(from, to, ());
        }

        citation
    }

    fn vertex(&mut self, id: &str, recorded: bool) -> NodeIndex {
        if let Some(&idx) = self.index.get(id) {
            return idx;
        }
        let idx = self.graph.add_node(PaperVertex {
            id: id.to_string(),
            recorded,
        });
        self.index.insert(id.to_string(), idx);
        idx
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Citations received by `id` (0 for unknown ids).
    pub fn in_degree(&self, id: &str) -> usize {
        self.degree(id, Direction::Incoming)
    }

    /// References made by `id` (0 for unknown ids).
    pub fn out_degree(&self, id: &str) -> usize {
        self.degree(id, Direction::Outgoing)
    }

    fn degree(&self, id: &str, direction: Direction) -> usize {
        self.index
            .get(id)
            .map(|&idx| self.graph.edges_directed(idx, direction).count())
            .unwrap_or(0)
    }

    /// Recorded papers reachable from `root` along citation edges, root first.
    pub fn ego_nodes(&self, root: &str) -> Vec<NodeIndex> {
        let Some(&start) = self.index.get(root) else {
            return Vec::new();
        };
        if !self.graph[start].recorded {
            return Vec::new();
        }

        let mut seen = HashSet::from([start]);
        let mut order = vec![start];
        let mut queue = VecDeque::from([start]);

        while let Some(current) = queue.pop_front() {
            for next in self.graph.neighbors_directed(current, Direction::Outgoing) {
                if self.graph[next].recorded && seen.insert(next) {
                    order.push(next);
                    queue.push_back(next);
                }
            }
        }

        order
    }

    /// Undirected simple ego subgraph around `root`; `None` if the root is
    /// not a recorded paper.
    pub fn ego_graph(&self, root: &str) -> Option<EgoGraph> {
        let members = self.ego_nodes(root);
        if members.is_empty() {
            return None;
        }

        let mut graph = UnGraph::with_capacity(members.len(), 0);
        let mut mapping = HashMap::with_capacity(members.len());
        for &old in &members {
            let new = graph.add_node(self.graph[old].id.clone());
            mapping.insert(old, new);
        }

        for edge in self.graph.edge_references() {
            let (Some(&a), Some(&b)) = (mapping.get(&edge.source()), mapping.get(&edge.target()))
            else {
                continue;
            };
            if a != b {
                graph.update_edge(a, b, ());
            }
        }

        Some(EgoGraph {
            graph,
            root: mapping[&members[0]],
        })
    }
}

/// Simple undirected ego subgraph: no parallel edges, no self-loops
#[derive(Debug, Clone)]
pub struct EgoGraph {
    pub graph: UnGraph<String, ()>,
    pub root: NodeIndex,
}

impl EgoGraph {
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

/// Vertex of the author graph
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorVertex {
    pub id: String,
    /// Institution ids across all of the author's papers, first-seen order
    pub institutions: Vec<String>,
    /// Publication year of the first paper seen for this author
    pub first_year: i32,
    /// Time-sliced citation count; `None` until looked up or if the lookup failed
    pub citation_count: Option<f64>,
}

impl AuthorVertex {
    pub fn first_institution(&self) -> Option<&str> {
        self.institutions.first().map(String::as_str)
    }
}

/// Directed, weighted author graph derived from citations
#[derive(Debug, Clone)]
pub struct AuthorGraph {
    graph: DiGraph<AuthorVertex, f64>,
    index: HashMap<String, NodeIndex>,
}

impl AuthorGraph {
    /// Project citations through authorship: every author of the citing
    /// paper gets an edge to every author of the cited paper.
    pub fn from_network(network: &Network) -> Self {
        let mut authors = Self {
            graph: DiGraph::new(),
            index: HashMap::new(),
        };

        for author_edge in &network.author_edges {
            let paper = network.nodes.get(&author_edge.paper_id);
            let year = paper.map(|p| p.publication_year).unwrap_or(0);
            let idx = authors.vertex(&author_edge.author_id, year);

            let institutions = paper
                .into_iter()
                .flat_map(|p| p.authorships.iter())
                .filter(|a| a.author_id == author_edge.author_id)
                .flat_map(|a| a.institutions.iter());
            for institution in institutions {
                let vertex = &mut authors.graph[idx];
                if !vertex.institutions.contains(institution) {
                    vertex.institutions.push(institution.clone());
                }
            }
        }

        // Authors known only from the author table
        let mut orphans: Vec<&String> = network
            .authors
            .keys()
            .filter(|id| !authors.index.contains_key(*id))
            .collect();
        orphans.sort();
        for id in orphans {
            let idx = authors.vertex(id, 0);
            authors.graph[idx].institutions = network.authors[id].institutions.clone();
        }

        let mut edge_index: HashMap<(NodeIndex, NodeIndex), EdgeIndex> = HashMap::new();
        for edge in &network.edges {
            let cited: Vec<NodeIndex> = network
                .authors_of(&edge.cited)
                .filter_map(|a| authors.index.get(a).copied())
                .collect();
            if cited.is_empty() {
                continue;
            }
            let citing: Vec<NodeIndex> = network
                .authors_of(&edge.citing)
                .filter_map(|a| authors.index.get(a).copied())
                .collect();

            for &from in &citing {
                for &to in &cited {
                    match edge_index.get(&(from, to)) {
                        Some(&e) => authors.graph[e] += 1.0,
                        None => {
                            let e = authors.graph.add_edge(from, to, 1.0);
                            edge_index.insert((from, to), e);
                        }
                    }
                }
            }
        }

        authors
    }

    fn vertex(&mut self, id: &str, first_year: i32) -> NodeIndex {
        if let Some(&idx) = self.index.get(id) {
            return idx;
        }
        let idx = self.graph.add_node(AuthorVertex {
            id: id.to_string(),
            institutions: Vec::new(),
            first_year,
            citation_count: None,
        });
        self.index.insert(id.to_string(), idx);
        idx
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn get(&self, id: &str) -> Option<&AuthorVertex> {
        self.index.get(id).map(|&idx| &self.graph[idx])
    }

    pub fn vertices(&self) -> impl Iterator<Item = &AuthorVertex> {
        self.graph.node_weights()
    }

    /// Attach looked-up citation counts; authors missing from `counts` keep `None`.
    pub fn set_citation_counts(&mut self, counts: &HashMap<String, u64>) {
        for vertex in self.graph.node_weights_mut() {
            vertex.citation_count = counts.get(&vertex.id).map(|&c| c as f64);
        }
    }

    /// Sum of outgoing edge weights per author.
    pub fn weighted_out_degrees(&self) -> Vec<f64> {
        self.graph
            .node_indices()
            .map(|idx| self.graph.edges_directed(idx, Direction::Outgoing).map(|e| *e.weight()).sum())
            .collect()
    }

    /// `(source, target, weight)` for every edge.
    pub fn weighted_edges(&self) -> impl Iterator<Item = (&AuthorVertex, &AuthorVertex, f64)> {
        self.graph
            .edge_references()
            .map(|e| (&self.graph[e.source()], &self.graph[e.target()], *e.weight()))
    }

    /// Authors that receive at least one citation inside the network.
    pub fn cited_authors(&self) -> impl Iterator<Item = &AuthorVertex> {
        self.graph
            .node_indices()
            .filter(|&idx| self.graph.edges_directed(idx, Direction::Incoming).next().is_some())
            .map(|idx| &self.graph[idx])
    }

    /// Authors adjacent to `id` in either direction, excluding `id` itself.
    pub fn neighbors(&self, id: &str) -> Vec<&AuthorVertex> {
        let Some(&idx) = self.index.get(id) else {
            return Vec::new();
        };
        let unique: HashSet<NodeIndex> = self
            .graph
            .neighbors_undirected(idx)
            .filter(|&n| n != idx)
            .collect();
        let mut neighbors: Vec<NodeIndex> = unique.into_iter().collect();
        neighbors.sort();
        neighbors.into_iter().map(|n| &self.graph[n]).collect()
    }
}
