//! Assortativity coefficients over weighted directed edge lists.
//!
//! Callers pass only edges whose endpoints both carry the attribute. Every
//! degenerate case (no edges, one category, zero variance) is `None`.

use std::collections::{BTreeMap, BTreeSet};

const EPS: f64 = 1e-12;

/// Newman's attribute assortativity for categorical values.
///
/// `r = (Σ e_ii − Σ a_i b_i) / (1 − Σ a_i b_i)` where `e` is the normalized
/// mixing matrix and `a`/`b` its row/column sums.
pub fn attribute_assortativity<'a>(
    edges: impl IntoIterator<Item = (&'a str, &'a str, f64)>,
) -> Option<f64> {
    let mut mixing: BTreeMap<(&str, &str), f64> = BTreeMap::new();
    let mut rows: BTreeMap<&str, f64> = BTreeMap::new();
    let mut cols: BTreeMap<&str, f64> = BTreeMap::new();
    let mut total = 0.0;

    for (source, target, weight) in edges {
        *mixing.entry((source, target)).or_insert(0.0) += weight;
        *rows.entry(source).or_insert(0.0) += weight;
        *cols.entry(target).or_insert(0.0) += weight;
        total += weight;
    }

    if total <= EPS {
        return None;
    }

    let categories: BTreeSet<&str> = rows.keys().chain(cols.keys()).copied().collect();
    let trace: f64 = categories
        .iter()
        .map(|c| mixing.get(&(*c, *c)).copied().unwrap_or(0.0))
        .sum::<f64>()
        / total;
    let expected: f64 = categories
        .iter()
        .map(|c| {
            let a = rows.get(c).copied().unwrap_or(0.0) / total;
            let b = cols.get(c).copied().unwrap_or(0.0) / total;
            a * b
        })
        .sum();

    let denominator = 1.0 - expected;
    if denominator.abs() <= EPS {
        return None;
    }

    Some((trace - expected) / denominator)
}

/// Numeric assortativity: weighted Pearson correlation between source and
/// target values.
pub fn numeric_assortativity(edges: impl IntoIterator<Item = (f64, f64, f64)>) -> Option<f64> {
    let edges: Vec<(f64, f64, f64)> = edges.into_iter().collect();
    let total: f64 = edges.iter().map(|(_, _, w)| w).sum();
    if total <= EPS {
        return None;
    }

    let mean_x = edges.iter().map(|(x, _, w)| w * x).sum::<f64>() / total;
    let mean_y = edges.iter().map(|(_, y, w)| w * y).sum::<f64>() / total;

    let mut covariance = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y, w) in &edges {
        covariance += w * (x - mean_x) * (y - mean_y);
        var_x += w * (x - mean_x).powi(2);
        var_y += w * (y - mean_y).powi(2);
    }

    if var_x <= EPS || var_y <= EPS {
        return None;
    }

    let r = covariance / (var_x.sqrt() * var_y.sqrt());
    r.is_finite().then_some(r)
}
