//! Distribution summaries: Gini coefficient, mean, standard deviation.

/// Gini coefficient via the area under the Lorenz curve.
///
/// The curve starts at (0, 0), so a uniform distribution scores 0 and a
/// single holder among `n` values scores `1 - 1/n`. Empty input or a zero
/// total scores 0.
pub fn gini(values: &[f64]) -> f64 {
    let total: f64 = values.iter().sum();
    if values.is_empty() || total <= 0.0 {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let n = sorted.len() as f64;
    let mut area = 0.0;
    let mut previous = 0.0;
    let mut cumulative = 0.0;
    for value in sorted {
        cumulative += value / total;
        area += (previous + cumulative) / (2.0 * n);
        previous = cumulative;
    }

    1.0 - 2.0 * area
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation (divides by `n`).
pub fn population_std(values: &[f64]) -> Option<f64> {
    let mu = mean(values)?;
    let variance = values.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}
