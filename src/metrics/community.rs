//! Community detection by greedy modularity agglomeration
//! (Clauset, Newman & Moore 2004) and the modularity score itself.
//!
//! Ties are broken by the lowest community pair, so the partition is
//! deterministic for a given node numbering. Other implementations may pick
//! a different partition of equal or similar quality.

use super::structure::Adjacency;
use std::collections::BTreeMap;

/// Community label per node, labels in `0..k`.
pub fn greedy_modularity_communities(adj: &Adjacency) -> Vec<usize> {
    let n = adj.node_count();
    let m = adj.edge_count();
    let mut labels: Vec<usize> = (0..n).collect();
    if m == 0 {
        return labels;
    }

    let two_m = 2.0 * m as f64;

    // a[i]: fraction of edge ends attached to community i
    let mut a: Vec<f64> = (0..n).map(|v| adj.degree(v) as f64 / two_m).collect();
    // e[i][j]: half the fraction of edges joining communities i and j
    let mut e: Vec<BTreeMap<usize, f64>> = vec![BTreeMap::new(); n];
    for (u, v) in adj.edges() {
        *e[u].entry(v).or_insert(0.0) += 1.0 / two_m;
        *e[v].entry(u).or_insert(0.0) += 1.0 / two_m;
    }

    loop {
        let mut best: Option<(f64, usize, usize)> = None;
        for (i, row) in e.iter().enumerate() {
            for (&j, &e_ij) in row.range(i + 1..) {
                let dq = 2.0 * (e_ij - a[i] * a[j]);
                if best.map_or(true, |(best_dq, _, _)| dq > best_dq) {
                    best = Some((dq, i, j));
                }
            }
        }

        let Some((dq, keep, absorb)) = best else {
            break;
        };
        if dq <= 1e-12 {
            break;
        }

        // Fold community `absorb` into `keep`
        let absorbed = std::mem::take(&mut e[absorb]);
        for (k, value) in absorbed {
            if k == keep {
                continue;
            }
            *e[keep].entry(k).or_insert(0.0) += value;
            e[k].remove(&absorb);
            *e[k].entry(keep).or_insert(0.0) += value;
        }
        e[keep].remove(&absorb);
        a[keep] += a[absorb];
        a[absorb] = 0.0;

        for label in labels.iter_mut() {
            if *label == absorb {
                *label = keep;
            }
        }
    }

    compact_labels(&labels)
}

fn compact_labels(labels: &[usize]) -> Vec<usize> {
    let mut mapping = BTreeMap::new();
    labels
        .iter()
        .map(|label| {
            let next = mapping.len();
            *mapping.entry(*label).or_insert(next)
        })
        .collect()
}

/// Modularity of a partition; `None` for a graph without edges.
pub fn modularity(adj: &Adjacency, labels: &[usize]) -> Option<f64> {
    let m = adj.edge_count();
    if m == 0 || labels.len() != adj.node_count() {
        return None;
    }
    let m = m as f64;

    let mut internal: BTreeMap<usize, f64> = BTreeMap::new();
    let mut degree: BTreeMap<usize, f64> = BTreeMap::new();
    for v in 0..adj.node_count() {
        *degree.entry(labels[v]).or_insert(0.0) += adj.degree(v) as f64;
    }
    for (u, v) in adj.edges() {
        if labels[u] == labels[v] {
            *internal.entry(labels[u]).or_insert(0.0) += 1.0;
        }
    }

    let q: f64 = degree
        .iter()
        .map(|(community, d)| {
            let l = internal.get(community).copied().unwrap_or(0.0);
            l / m - (d / (2.0 * m)).powi(2)
        })
        .sum();
    Some(q)
}
