//! Structural metrics on simple undirected graphs: clustering, shortest
//! paths, connectivity and betweenness centrality.

use petgraph::graph::UnGraph;
use petgraph::visit::EdgeRef;
use std::collections::VecDeque;

/// Sorted, deduplicated neighbor lists without self-loops.
///
/// Node `i` corresponds to `NodeIndex::new(i)` of the source graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adjacency {
    neighbors: Vec<Vec<usize>>,
}

impl Adjacency {
    pub fn from_graph<N, E>(graph: &UnGraph<N, E>) -> Self {
        let edges = graph
            .edge_references()
            .map(|e| (e.source().index(), e.target().index()));
        Self::from_edges(graph.node_count(), edges)
    }

    /// Build from an edge list over nodes `0..n`; loops and repeats are dropped.
    pub fn from_edges(n: usize, edges: impl IntoIterator<Item = (usize, usize)>) -> Self {
        let mut neighbors = vec![Vec::new(); n];
        for (a, b) in edges {
            if a == b || a >= n || b >= n {
                continue;
            }
            neighbors[a].push(b);
            neighbors[b].push(a);
        }
        for list in &mut neighbors {
            list.sort_unstable();
            list.dedup();
        }
        Self { neighbors }
    }

    pub fn node_count(&self) -> usize {
        self.neighbors.len()
    }

    pub fn edge_count(&self) -> usize {
        self.neighbors.iter().map(Vec::len).sum::<usize>() / 2
    }

    pub fn degree(&self, node: usize) -> usize {
        self.neighbors[node].len()
    }

    pub fn neighbors(&self, node: usize) -> &[usize] {
        &self.neighbors[node]
    }

    pub fn has_edge(&self, a: usize, b: usize) -> bool {
        self.neighbors
            .get(a)
            .is_some_and(|list| list.binary_search(&b).is_ok())
    }

    /// Each undirected edge once, as `(low, high)`.
    pub fn edges(&self) -> Vec<(usize, usize)> {
        self.neighbors
            .iter()
            .enumerate()
            .flat_map(|(a, list)| list.iter().filter(move |&&b| a < b).map(move |&b| (a, b)))
            .collect()
    }
}

/// Fraction of possible links among the neighbors of `node` that exist.
///
/// 0 for degree below 2.
pub fn local_clustering(adj: &Adjacency, node: usize) -> f64 {
    let neighbors = adj.neighbors(node);
    let k = neighbors.len();
    if k < 2 {
        return 0.0;
    }

    let mut links = 0usize;
    for (i, &a) in neighbors.iter().enumerate() {
        for &b in &neighbors[i + 1..] {
            if adj.has_edge(a, b) {
                links += 1;
            }
        }
    }

    2.0 * links as f64 / (k * (k - 1)) as f64
}

/// Mean local clustering over all nodes, isolated nodes counting as 0.
pub fn average_clustering(adj: &Adjacency) -> f64 {
    let n = adj.node_count();
    if n == 0 {
        return 0.0;
    }
    (0..n).map(|v| local_clustering(adj, v)).sum::<f64>() / n as f64
}

/// Hop distances from `source`; `None` for unreachable nodes.
fn bfs_distances(adj: &Adjacency, source: usize) -> Vec<Option<usize>> {
    let mut dist = vec![None; adj.node_count()];
    let mut queue = VecDeque::from([source]);
    dist[source] = Some(0);

    while let Some(v) = queue.pop_front() {
        let next = dist[v].map_or(0, |d| d + 1);
        for &w in adj.neighbors(v) {
            if dist[w].is_none() {
                dist[w] = Some(next);
                queue.push_back(w);
            }
        }
    }

    dist
}

pub fn is_connected(adj: &Adjacency) -> bool {
    if adj.node_count() == 0 {
        return false;
    }
    bfs_distances(adj, 0).iter().all(Option::is_some)
}

/// Mean hop distance over all ordered pairs of distinct nodes.
///
/// `None` for fewer than 2 nodes or a disconnected graph.
pub fn average_shortest_path_length(adj: &Adjacency) -> Option<f64> {
    let n = adj.node_count();
    if n < 2 {
        return None;
    }

    let mut total = 0usize;
    for source in 0..n {
        for d in bfs_distances(adj, source) {
            total += d?;
        }
    }

    Some(total as f64 / (n * (n - 1)) as f64)
}

/// Normalized betweenness centrality of every node (Brandes).
///
/// Scaled by `1 / ((n-1)(n-2))`, so the center of a star scores 1.
pub fn betweenness_centrality(adj: &Adjacency) -> Vec<f64> {
    let n = adj.node_count();
    let mut centrality = vec![0.0; n];

    for s in 0..n {
        let mut stack = Vec::with_capacity(n);
        let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut sigma = vec![0.0f64; n];
        let mut dist: Vec<i64> = vec![-1; n];
        sigma[s] = 1.0;
        dist[s] = 0;

        let mut queue = VecDeque::from([s]);
        while let Some(v) = queue.pop_front() {
            stack.push(v);
            for &w in adj.neighbors(v) {
                if dist[w] < 0 {
                    dist[w] = dist[v] + 1;
                    queue.push_back(w);
                }
                if dist[w] == dist[v] + 1 {
                    sigma[w] += sigma[v];
                    predecessors[w].push(v);
                }
            }
        }

        let mut delta = vec![0.0f64; n];
        while let Some(w) = stack.pop() {
            for &v in &predecessors[w] {
                delta[v] += sigma[v] / sigma[w] * (1.0 + delta[w]);
            }
            if w != s {
                centrality[w] += delta[w];
            }
        }
    }

    if n > 2 {
        let scale = 1.0 / ((n - 1) * (n - 2)) as f64;
        for value in &mut centrality {
            *value *= scale;
        }
    }

    centrality
}
