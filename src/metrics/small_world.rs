//! Small-world coefficient sigma = (C / Cr) / (L / Lr).
//!
//! The reference graph keeps the degree sequence and is produced by random
//! double-edge swaps.

use super::structure::{average_clustering, average_shortest_path_length, Adjacency};
use rand::Rng;
use std::collections::HashSet;

/// Smallest graph a double-edge swap can rewire meaningfully
const MIN_NODES: usize = 4;

fn key(a: usize, b: usize) -> (usize, usize) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Degree-preserving randomization with `iterations × edges` swap attempts.
///
/// A swap turns `a-b, c-d` into `a-d, c-b` and is rejected when it would
/// create a self-loop or a parallel edge. Connectivity is not enforced.
pub fn random_reference<R: Rng + ?Sized>(adj: &Adjacency, iterations: usize, rng: &mut R) -> Adjacency {
    let mut edges = adj.edges();
    let m = edges.len();
    if m < 2 {
        return adj.clone();
    }

    let mut present: HashSet<(usize, usize)> = edges.iter().copied().collect();
    let attempts = iterations.saturating_mul(m);

    for _ in 0..attempts {
        let i = rng.gen_range(0..m);
        let j = rng.gen_range(0..m);
        if i == j {
            continue;
        }

        let (a, b) = edges[i];
        let (mut c, mut d) = edges[j];
        if rng.gen_bool(0.5) {
            std::mem::swap(&mut c, &mut d);
        }

        if a == d || c == b {
            continue;
        }
        let first = key(a, d);
        let second = key(c, b);
        if first == second || present.contains(&first) || present.contains(&second) {
            continue;
        }

        present.remove(&edges[i]);
        present.remove(&edges[j]);
        present.insert(first);
        present.insert(second);
        edges[i] = first;
        edges[j] = second;
    }

    Adjacency::from_edges(adj.node_count(), edges)
}

/// Small-world sigma, or `None` when it is undefined: fewer than four nodes,
/// a disconnected graph or reference, or a non-finite ratio.
pub fn small_world_sigma<R: Rng + ?Sized>(adj: &Adjacency, iterations: usize, rng: &mut R) -> Option<f64> {
    if adj.node_count() < MIN_NODES {
        return None;
    }

    let c = average_clustering(adj);
    let l = average_shortest_path_length(adj)?;

    let reference = random_reference(adj, iterations, rng);
    let cr = average_clustering(&reference);
    let lr = average_shortest_path_length(&reference)?;

    let sigma = (c / cr) / (l / lr);
    sigma.is_finite().then_some(sigma)
}
