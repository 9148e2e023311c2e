// Descriptive statistics over a numeric sample window
//
// Order statistics (min, max, median, percentiles) are read directly from the
// sorted f64 window so thresholds derived from them are exact. Mean and
// population standard deviation use trueno::Vector for SIMD reductions.
//
// Percentile index = floor(N * p), clamped to the last element. No
// interpolation: a percentile is always an observed value.

use thiserror::Error;
use trueno::Vector;

/// Errors raised by the statistics engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatisticsError {
    #[error("Insufficient data: need at least {required} samples, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("Statistics computation failed: {0}")]
    Compute(String),
}

pub type Result<T> = std::result::Result<T, StatisticsError>;

/// Summary of a sample window
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SummaryStats {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    /// Population standard deviation (divide by N)
    pub stddev: f64,
    pub min: f64,
    pub max: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Summarize a non-empty window of values
///
/// # Example
/// ```
/// use perfguard::statistics::summarize;
///
/// let stats = summarize(&[2.0, 4.0, 6.0, 8.0]).unwrap();
/// assert_eq!(stats.mean, 5.0);
/// assert_eq!(stats.min, 2.0);
/// assert_eq!(stats.max, 8.0);
/// ```
pub fn summarize(values: &[f64]) -> Result<SummaryStats> {
    if values.is_empty() {
        return Err(StatisticsError::InsufficientData {
            required: 1,
            actual: 0,
        });
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let (mean, stddev) = mean_and_stddev(&sorted)?;

    Ok(SummaryStats {
        count: sorted.len(),
        mean,
        median: percentile(&sorted, 0.5),
        stddev,
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        p90: percentile(&sorted, 0.90),
        p95: percentile(&sorted, 0.95),
        p99: percentile(&sorted, 0.99),
    })
}

/// Percentile of an ascending-sorted, non-empty slice using floor(N * p)
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    let index = ((sorted.len() as f64) * p).floor() as usize;
    sorted[index.min(sorted.len() - 1)]
}

/// Mean and population standard deviation via trueno
///
/// A window of identical values reports stddev 0 exactly, so callers can
/// rely on `stddev == 0.0` as the degenerate-window sentinel.
pub fn mean_and_stddev(values: &[f64]) -> Result<(f64, f64)> {
    if values.is_empty() {
        return Err(StatisticsError::InsufficientData {
            required: 1,
            actual: 0,
        });
    }

    if values.iter().all(|v| *v == values[0]) {
        return Ok((values[0], 0.0));
    }

    // Center on the first value before narrowing to f32 so large magnitudes
    // (memory in bytes) keep their precision in the reductions.
    let origin = values[0];
    let centered: Vec<f32> = values.iter().map(|v| (v - origin) as f32).collect();
    let v = Vector::from_slice(&centered);

    let mean = v
        .mean()
        .map_err(|e| StatisticsError::Compute(format!("mean: {}", e)))?;
    let stddev = v
        .stddev()
        .map_err(|e| StatisticsError::Compute(format!("stddev: {}", e)))?;

    Ok((origin + mean as f64, (stddev as f64).max(0.0)))
}
