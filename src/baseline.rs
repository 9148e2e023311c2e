//! Long-run reference distribution per metric
//!
//! Baselines are loaded at startup and replaced wholesale; the engine never
//! edits one in place. A replacement set is validated before it is swapped
//! in, so the store only ever holds baselines that satisfy their invariants.

use crate::metrics::Metric;
use crate::persistence;
use crate::statistics::SummaryStats;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Errors raised for invalid baselines
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BaselineError {
    #[error("Baseline for {metric} has negative or non-finite stddev {stddev}")]
    InvalidStddev { metric: Metric, stddev: f64 },

    #[error("Baseline for {metric} has non-monotonic percentiles: {detail}")]
    NonMonotonicPercentiles { metric: Metric, detail: String },

    #[error("Baseline for {metric} has non-finite mean")]
    InvalidMean { metric: Metric },
}

/// Percentile ladder of a baseline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Reference distribution for one metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Baseline {
    pub mean: f64,
    pub stddev: f64,
    pub percentiles: Percentiles,
    /// Milliseconds since the Unix epoch
    pub established_at: u64,
    pub sample_size: usize,
}

impl Baseline {
    /// Build a baseline from a statistics summary
    pub fn from_stats(stats: &SummaryStats, established_at: u64) -> Self {
        Self {
            mean: stats.mean,
            stddev: stats.stddev,
            percentiles: Percentiles {
                p50: stats.median,
                p90: stats.p90,
                p95: stats.p95,
                p99: stats.p99,
            },
            established_at,
            sample_size: stats.count,
        }
    }

    /// Check stddev >= 0 and p50 <= p90 <= p95 <= p99
    pub fn validate(&self, metric: Metric) -> Result<(), BaselineError> {
        if !self.mean.is_finite() {
            return Err(BaselineError::InvalidMean { metric });
        }
        if !self.stddev.is_finite() || self.stddev < 0.0 {
            return Err(BaselineError::InvalidStddev {
                metric,
                stddev: self.stddev,
            });
        }
        let p = &self.percentiles;
        let ladder = [("p50", p.p50), ("p90", p.p90), ("p95", p.p95), ("p99", p.p99)];
        for pair in ladder.windows(2) {
            let (lo_name, lo) = pair[0];
            let (hi_name, hi) = pair[1];
            if !(lo <= hi) {
                return Err(BaselineError::NonMonotonicPercentiles {
                    metric,
                    detail: format!("{}={} > {}={}", lo_name, lo, hi_name, hi),
                });
            }
        }
        Ok(())
    }

    /// Relative deviation of `value` from the mean, positive when worse
    ///
    /// `None` when the mean is zero (deviation undefined).
    pub fn deviation(&self, metric: Metric, value: f64) -> Option<f64> {
        if self.mean == 0.0 {
            return None;
        }
        Some(metric.worsening(value, self.mean) / self.mean.abs())
    }

    /// Absolute z-score of `value`, or `None` when stddev is 0
    pub fn z_score(&self, value: f64) -> Option<f64> {
        if self.stddev > 0.0 {
            Some((value - self.mean).abs() / self.stddev)
        } else {
            None
        }
    }
}

fn default_baseline(metric: Metric) -> Baseline {
    let (mean, stddev, p50, p90, p95, p99) = match metric {
        Metric::ExecutionTime => (1000.0, 250.0, 950.0, 1350.0, 1500.0, 1900.0),
        Metric::MemoryUsage => {
            let mib = 1024.0 * 1024.0;
            (
                256.0 * mib,
                32.0 * mib,
                250.0 * mib,
                300.0 * mib,
                315.0 * mib,
                350.0 * mib,
            )
        }
        Metric::CpuUsage => (35.0, 10.0, 33.0, 50.0, 55.0, 65.0),
        Metric::ErrorRate => (0.5, 0.3, 0.4, 0.9, 1.1, 1.5),
        Metric::Throughput => (100.0, 20.0, 100.0, 125.0, 132.0, 145.0),
    };
    Baseline {
        mean,
        stddev,
        percentiles: Percentiles { p50, p90, p95, p99 },
        established_at: 0,
        sample_size: 0,
    }
}

/// Built-in baselines used when no snapshot is available
pub fn default_baselines() -> BTreeMap<Metric, Baseline> {
    Metric::ALL
        .iter()
        .map(|m| (*m, default_baseline(*m)))
        .collect()
}

/// Holds the current baseline per metric
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineStore {
    baselines: BTreeMap<Metric, Baseline>,
}

impl Default for BaselineStore {
    fn default() -> Self {
        Self {
            baselines: default_baselines(),
        }
    }
}

impl BaselineStore {
    /// Store seeded with validated baselines; metrics missing from `baselines`
    /// keep their defaults
    pub fn new(baselines: BTreeMap<Metric, Baseline>) -> Result<Self, BaselineError> {
        let mut store = Self::default();
        store.replace(baselines)?;
        Ok(store)
    }

    /// Load a JSON snapshot (`{"executionTime": {...}, ...}`)
    ///
    /// Missing or unparseable documents fall back to defaults. Individually
    /// invalid entries are skipped with a warning.
    pub fn load(path: &Path) -> Self {
        let mut store = Self::default();
        let Some(raw) = persistence::load_or_default::<BTreeMap<String, Baseline>>(path) else {
            return store;
        };

        for (name, baseline) in raw {
            let metric = match name.parse::<Metric>() {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring baseline for unknown metric");
                    continue;
                }
            };
            match baseline.validate(metric) {
                Ok(()) => {
                    store.baselines.insert(metric, baseline);
                }
                Err(e) => tracing::warn!(error = %e, "ignoring invalid baseline"),
            }
        }
        tracing::info!(path = %path.display(), "loaded baseline snapshot");
        store
    }

    /// Swap in a new set of baselines
    ///
    /// All entries are validated first; on error the store is unchanged.
    pub fn replace(&mut self, baselines: BTreeMap<Metric, Baseline>) -> Result<(), BaselineError> {
        for (metric, baseline) in &baselines {
            baseline.validate(*metric)?;
        }
        for (metric, baseline) in baselines {
            self.baselines.insert(metric, baseline);
        }
        Ok(())
    }

    pub fn get(&self, metric: Metric) -> Option<&Baseline> {
        self.baselines.get(&metric)
    }

    pub fn all(&self) -> &BTreeMap<Metric, Baseline> {
        &self.baselines
    }

    /// Serialize as the snapshot document `load` reads
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        let raw: BTreeMap<&str, &Baseline> = self
            .baselines
            .iter()
            .map(|(m, b)| (m.as_str(), b))
            .collect();
        serde_json::to_vec_pretty(&raw)
    }
}
