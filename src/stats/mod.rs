//! Latency statistics engine
//!
//! A pure, total function from an unordered list of millisecond samples to a
//! [`LatencyStats`] record.

use crate::models::LatencyStats;

/// Compute min/avg/median/max/jitter over `samples`.
///
/// Samples are sorted first; jitter is the mean absolute difference between
/// neighbours in sorted order, not in arrival order. Empty input yields the
/// zero record.
pub fn compute(samples: &[f64]) -> LatencyStats {
    if samples.is_empty() {
        return LatencyStats::empty();
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let n = sorted.len();
    let sum: f64 = sorted.iter().sum();
    let median = if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    };

    let jitter = if n > 1 {
        let total: f64 = sorted.windows(2).map(|pair| (pair[1] - pair[0]).abs()).sum();
        total / (n - 1) as f64
    } else {
        0.0
    };

    LatencyStats {
        min: round2(sorted[0]),
        avg: round2((sum / n as f64).clamp(sorted[0], sorted[n - 1])),
        median: round2(median),
        max: round2(sorted[n - 1]),
        jitter: round2(jitter),
        n,
    }
}

/// Round to two decimals, half away from zero
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
