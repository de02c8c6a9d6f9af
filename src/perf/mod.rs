//! Summary statistics for repeated measurements
//!
//! - [`MetricSummary`]: min / max / mean / median / p95 of one metric
//! - [`percentile`]: nearest-rank percentile over sorted values
//! - [`timed`]: wall time of an async operation on the runtime clock

use std::{future::Future, time::Duration};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Aggregate of one metric's values across a launch series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MetricSummary {
    /// Collected values in collection order
    pub values: Vec<f64>,
    /// Smallest value
    pub min:    f64,
    /// Largest value
    pub max:    f64,
    /// Arithmetic mean
    pub mean:   f64,
    /// Middle value, or mean of the two middle values
    pub median: f64,
    /// 95th percentile, nearest rank
    pub p95:    f64,
}

impl MetricSummary {
    /// Summarizes `values`; `None` when empty
    pub fn from_values(values: Vec<f64>) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let mut sorted = values.clone();
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len();
        let mean = sorted.iter().sum::<f64>() / n as f64;
        let median = if n % 2 == 0 {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        } else {
            sorted[n / 2]
        };

        Some(Self {
            min: sorted[0],
            max: sorted[n - 1],
            mean,
            median,
            p95: percentile(&sorted, 95.0)?,
            values,
        })
    }

    /// Number of values
    pub fn count(&self) -> usize {
        self.values.len()
    }
}

/// Nearest-rank percentile of ascending `sorted` values
pub fn percentile(sorted: &[f64], percentile: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }

    let rank = (percentile / 100.0 * sorted.len() as f64).ceil() as usize;
    let index = rank.min(sorted.len()).saturating_sub(1);
    Some(sorted[index])
}

/// Awaits `operation` and returns its output with the elapsed time
pub async fn timed<F, T>(operation: F) -> (T, Duration)
where
    F: Future<Output = T>,
{
    let start = Instant::now();
    let output = operation.await;
    (output, start.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_of_odd_count() {
        let summary = MetricSummary::from_values(vec![300.0, 100.0, 200.0]).unwrap();
        assert_eq!(summary.min, 100.0);
        assert_eq!(summary.max, 300.0);
        assert_eq!(summary.mean, 200.0);
        assert_eq!(summary.median, 200.0);
        assert_eq!(summary.p95, 300.0);
        // Collection order is preserved
        assert_eq!(summary.values, vec![300.0, 100.0, 200.0]);
        assert_eq!(summary.count(), 3);
    }

    #[test]
    fn test_median_of_even_count() {
        let summary = MetricSummary::from_values(vec![4.0, 1.0, 3.0, 2.0]).unwrap();
        assert_eq!(summary.median, 2.5);
    }

    #[test]
    fn test_empty_has_no_summary() {
        assert!(MetricSummary::from_values(Vec::new()).is_none());
        assert!(percentile(&[], 50.0).is_none());
    }

    #[test]
    fn test_nearest_rank_percentile() {
        let sorted: Vec<f64> = (1..=20).map(f64::from).collect();
        assert_eq!(percentile(&sorted, 95.0), Some(19.0));
        assert_eq!(percentile(&sorted, 50.0), Some(10.0));
        assert_eq!(percentile(&sorted, 100.0), Some(20.0));
        assert_eq!(percentile(&sorted, 0.0), Some(1.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed() {
        let (value, elapsed) = timed(async {
            tokio::time::sleep(Duration::from_millis(250)).await;
            42
        })
        .await;

        assert_eq!(value, 42);
        assert_eq!(elapsed, Duration::from_millis(250));
    }
}
