//! Metric samples and the metric vocabulary shared by every component
//!
//! Samples are produced by an external sampler and consumed read-only.
//! Each metric carries a polarity: for most of them a larger value is worse,
//! for throughput a smaller value is worse. Comparisons that ask "is this
//! worse?" go through [`Metric::worsening`] so the formulas stay identical
//! for the lower-is-better metrics.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A measured performance dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    /// Wall-clock execution time in milliseconds
    ExecutionTime,
    /// Resident memory in bytes
    MemoryUsage,
    /// CPU utilisation in percent (0-100)
    CpuUsage,
    /// Error rate in percent (0-100)
    ErrorRate,
    /// Completed operations per second
    Throughput,
}

/// Direction in which a metric gets worse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    /// Larger values are worse (latency, memory, CPU, errors)
    LowerIsBetter,
    /// Smaller values are worse (throughput)
    HigherIsBetter,
}

impl Metric {
    /// Every metric, in canonical order
    pub const ALL: [Metric; 5] = [
        Metric::ExecutionTime,
        Metric::MemoryUsage,
        Metric::CpuUsage,
        Metric::ErrorRate,
        Metric::Throughput,
    ];

    /// Metrics whose thresholds are moved by statistical adjustment
    pub const ADJUSTABLE: [Metric; 3] =
        [Metric::ExecutionTime, Metric::MemoryUsage, Metric::CpuUsage];

    pub fn polarity(self) -> Polarity {
        match self {
            Metric::Throughput => Polarity::HigherIsBetter,
            _ => Polarity::LowerIsBetter,
        }
    }

    /// Sign that turns "value went up" into "metric got worse"
    pub fn worsening_sign(self) -> f64 {
        match self.polarity() {
            Polarity::LowerIsBetter => 1.0,
            Polarity::HigherIsBetter => -1.0,
        }
    }

    /// Signed change of `value` relative to `reference`, positive when worse
    pub fn worsening(self, value: f64, reference: f64) -> f64 {
        (value - reference) * self.worsening_sign()
    }

    /// True if `value` breaches `threshold` for this metric
    pub fn breaches(self, value: f64, threshold: f64) -> bool {
        match self.polarity() {
            Polarity::LowerIsBetter => value > threshold,
            Polarity::HigherIsBetter => value < threshold,
        }
    }

    /// How far past the threshold a value is, as a ratio (>1 means breached)
    ///
    /// Returns `None` when the ratio is undefined (non-positive denominator).
    pub fn breach_ratio(self, value: f64, threshold: f64) -> Option<f64> {
        let (num, den) = match self.polarity() {
            Polarity::LowerIsBetter => (value, threshold),
            Polarity::HigherIsBetter => (threshold, value),
        };
        if den > 0.0 {
            Some(num / den)
        } else {
            None
        }
    }

    /// Loosen a threshold by `factor` in the direction that tolerates more
    pub fn relax(self, threshold: f64, factor: f64) -> f64 {
        match self.polarity() {
            Polarity::LowerIsBetter => threshold * factor,
            Polarity::HigherIsBetter => threshold / factor,
        }
    }

    /// Wire name (camelCase)
    pub fn as_str(self) -> &'static str {
        match self {
            Metric::ExecutionTime => "executionTime",
            Metric::MemoryUsage => "memoryUsage",
            Metric::CpuUsage => "cpuUsage",
            Metric::ErrorRate => "errorRate",
            Metric::Throughput => "throughput",
        }
    }

    /// Unit suffix for reports
    pub fn unit(self) -> &'static str {
        match self {
            Metric::ExecutionTime => "ms",
            Metric::MemoryUsage => "bytes",
            Metric::CpuUsage | Metric::ErrorRate => "%",
            Metric::Throughput => "ops/s",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "executionTime" | "execution_time" | "execution-time" => Ok(Metric::ExecutionTime),
            "memoryUsage" | "memory_usage" | "memory-usage" | "memory" => Ok(Metric::MemoryUsage),
            "cpuUsage" | "cpu_usage" | "cpu-usage" | "cpu" => Ok(Metric::CpuUsage),
            "errorRate" | "error_rate" | "error-rate" => Ok(Metric::ErrorRate),
            "throughput" => Ok(Metric::Throughput),
            other => Err(format!("Unknown metric: {}", other)),
        }
    }
}

/// One snapshot delivered by the sampler
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSample {
    pub execution_time_ms: f64,
    pub memory_bytes: f64,
    pub cpu_percent: f64,
    pub error_rate_percent: f64,
    pub throughput_ops_per_sec: f64,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
}

impl MetricSample {
    /// Project the sample onto a single metric
    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::ExecutionTime => self.execution_time_ms,
            Metric::MemoryUsage => self.memory_bytes,
            Metric::CpuUsage => self.cpu_percent,
            Metric::ErrorRate => self.error_rate_percent,
            Metric::Throughput => self.throughput_ops_per_sec,
        }
    }

    /// Extract one metric's series from a batch of samples, preserving order
    pub fn series(samples: &[MetricSample], metric: Metric) -> Vec<f64> {
        samples.iter().map(|s| s.value(metric)).collect()
    }
}
