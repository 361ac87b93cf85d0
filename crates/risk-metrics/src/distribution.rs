use sim_core::HistogramBin;

/// Sort a copy of `values` ascending. NaNs compare as equal.
pub fn sorted_ascending(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    sorted
}

/// Nearest-rank percentile of an ascending population (`p` in 0-100).
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((p / 100.0) * (sorted.len() - 1) as f64).round();
    let idx = if idx.is_finite() && idx > 0.0 { idx as usize } else { 0 };
    sorted[idx.min(sorted.len() - 1)]
}

/// Median of an ascending population.
pub fn median_sorted(sorted: &[f64]) -> f64 {
    percentile_sorted(sorted, 50.0)
}

/// Equal-width histogram spanning `[min, max]` of the data.
///
/// A degenerate population (all values equal) gets unit-width bins starting
/// at that value. Empty input yields no bins.
pub fn histogram(values: &[f64], bins: usize) -> Vec<HistogramBin> {
    if values.is_empty() || bins == 0 {
        return Vec::new();
    }

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = if max > min { max - min } else { bins as f64 };
    let width = span / bins as f64;

    let mut counts = vec![0usize; bins];
    for &v in values {
        let idx = ((v - min) / width).floor();
        let idx = if idx.is_finite() && idx > 0.0 { idx as usize } else { 0 };
        counts[idx.min(bins - 1)] += 1;
    }

    let total = values.len() as f64;
    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            lower: min + i as f64 * width,
            upper: min + (i + 1) as f64 * width,
            count,
            frequency: count as f64 / total * 100.0,
        })
        .collect()
}

/// Histogram over fixed bin edges.
///
/// `edges` must be ascending; bin `i` covers `[edges[i], edges[i + 1])` and the
/// last bin also absorbs everything at or above its lower edge. Values below
/// the first edge land in the first bin.
pub fn histogram_with_edges(values: &[f64], edges: &[f64]) -> Vec<HistogramBin> {
    if edges.len() < 2 {
        return Vec::new();
    }

    let bins = edges.len() - 1;
    let mut counts = vec![0usize; bins];
    for &v in values {
        let idx = edges[1..bins]
            .iter()
            .position(|&upper| v < upper)
            .unwrap_or(bins - 1);
        counts[idx] += 1;
    }

    let total = values.len() as f64;
    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            lower: edges[i],
            upper: edges[i + 1],
            count,
            frequency: if total > 0.0 { count as f64 / total * 100.0 } else { 0.0 },
        })
        .collect()
}
