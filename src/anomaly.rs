//! Z-score outlier scan over a sample window
//!
//! Each metric is scanned independently against the window's own mean and
//! standard deviation (not the long-run baseline). A window whose values are
//! all equal has stddev 0; it is reported as anomaly-free rather than
//! dividing by zero.

use crate::config::AnomalyConfig;
use crate::metrics::{Metric, MetricSample};
use crate::statistics::mean_and_stddev;
use serde::{Deserialize, Serialize};

/// Anomaly severity classification based on z-score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalySeverity {
    /// warning_z < z <= critical_z
    Warning,
    /// z > critical_z
    Critical,
}

/// Detected anomaly with metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anomaly {
    pub metric: Metric,
    pub value: f64,
    /// Window mean
    pub expected_value: f64,
    /// |value - mean| / stddev
    pub deviation: f64,
    pub timestamp: u64,
    pub severity: AnomalySeverity,
}

/// Stateless z-score detector
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    config: AnomalyConfig,
}

impl AnomalyDetector {
    pub fn new(config: AnomalyConfig) -> Self {
        Self { config }
    }

    /// Classify a z-score, `None` when it is not anomalous
    pub fn classify(&self, z: f64) -> Option<AnomalySeverity> {
        if z > self.config.critical_z {
            Some(AnomalySeverity::Critical)
        } else if z > self.config.warning_z {
            Some(AnomalySeverity::Warning)
        } else {
            None
        }
    }

    /// Scan one metric's `(timestamp, value)` points
    pub fn detect_series(&self, metric: Metric, points: &[(u64, f64)]) -> Vec<Anomaly> {
        let values: Vec<f64> = points.iter().map(|(_, v)| *v).collect();
        let Ok((mean, stddev)) = mean_and_stddev(&values) else {
            return Vec::new();
        };
        if stddev <= 0.0 {
            return Vec::new();
        }

        points
            .iter()
            .filter_map(|(timestamp, value)| {
                let z = (value - mean).abs() / stddev;
                self.classify(z).map(|severity| Anomaly {
                    metric,
                    value: *value,
                    expected_value: mean,
                    deviation: z,
                    timestamp: *timestamp,
                    severity,
                })
            })
            .collect()
    }

    /// Scan every metric of a sample window
    pub fn detect(&self, samples: &[MetricSample]) -> Vec<Anomaly> {
        let mut anomalies = Vec::new();
        for metric in Metric::ALL {
            let points: Vec<(u64, f64)> = samples
                .iter()
                .map(|s| (s.timestamp, s.value(metric)))
                .collect();
            anomalies.extend(self.detect_series(metric, &points));
        }
        if !anomalies.is_empty() {
            tracing::debug!(count = anomalies.len(), "anomalies detected");
        }
        anomalies
    }
}
