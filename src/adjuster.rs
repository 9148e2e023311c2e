// Dynamic threshold adjustment
//
// A threshold needs to move when it is either
//   too strict: p90 > current * strict_ratio (traffic already near the limit)
//   too loose:  p99 < current * loose_ratio  (limit far above real traffic)
//
// The suggested value is p95 * margin. Before it is committed it must pass
// two guard rails: |new - old| / old <= max_change_ratio, and confidence >=
// min_confidence. Rejected suggestions are still returned so callers can see
// what was attempted and why it was refused.

use crate::config::AdjustmentConfig;
use crate::metrics::{Metric, MetricSample};
use crate::statistics::{summarize, SummaryStats};
use crate::thresholds::{ThresholdSet, ThresholdStore};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;

/// Why a threshold was considered for adjustment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentNeed {
    /// p90 is already close to the enforced limit
    TooStrict,
    /// p99 sits far below the enforced limit
    TooLoose,
}

impl AdjustmentNeed {
    fn describe(self) -> &'static str {
        match self {
            AdjustmentNeed::TooStrict => "threshold too strict: p90 close to limit",
            AdjustmentNeed::TooLoose => "threshold too loose: p99 far below limit",
        }
    }
}

/// One attempted adjustment
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdAdjustment {
    pub metric: Metric,
    pub old_value: f64,
    pub new_value: f64,
    /// Signed relative change, (new - old) / old
    pub change_ratio: f64,
    pub confidence: f64,
    pub need: AdjustmentNeed,
    pub reason: String,
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<String>,
}

/// Outcome of an adjustment round
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub adjustments: Vec<ThresholdAdjustment>,
    pub previous_thresholds: ThresholdSet,
    pub new_thresholds: ThresholdSet,
    pub confidence: f64,
    pub execution_time_ms: f64,
    /// Per-metric statistics the decisions were based on
    pub statistics: BTreeMap<Metric, SummaryStats>,
}

impl AdjustmentResult {
    /// Adjustments that were committed
    pub fn applied(&self) -> impl Iterator<Item = &ThresholdAdjustment> {
        self.adjustments.iter().filter(|a| a.applied)
    }

    pub fn applied_count(&self) -> usize {
        self.applied().count()
    }

    /// Generate human-readable report
    pub fn to_report_string(&self) -> String {
        let mut report = String::new();

        if !self.success {
            report.push_str("⚠️  NO ADJUSTMENT\n\n");
            if let Some(reason) = &self.reason {
                report.push_str(&format!("Reason: {}\n", reason));
            }
            return report;
        }

        if self.adjustments.is_empty() {
            report.push_str("✅ THRESHOLDS ADEQUATE\n\n");
        } else {
            report.push_str(&format!(
                "🔧 THRESHOLD ADJUSTMENT ({} applied, {} rejected)\n\n",
                self.applied_count(),
                self.adjustments.len() - self.applied_count()
            ));
        }
        report.push_str(&format!("Confidence: {:.2}\n", self.confidence));
        if let Some(reason) = &self.reason {
            report.push_str(&format!("Reason: {}\n", reason));
        }

        for adj in &self.adjustments {
            let marker = if adj.applied { "✓" } else { "✗" };
            report.push_str(&format!(
                "  {} {}: {:.2} → {:.2} ({:+.1}%) - {}\n",
                marker,
                adj.metric,
                adj.old_value,
                adj.new_value,
                adj.change_ratio * 100.0,
                adj.reason
            ));
            if let Some(rejection) = &adj.rejection {
                report.push_str(&format!("      rejected: {}\n", rejection));
            }
        }

        report.push_str(&format!("\nCurrent thresholds: {}\n", self.new_thresholds));
        report
    }
}

/// Decides whether and how far enforced thresholds should move
#[derive(Debug, Clone)]
pub struct ThresholdAdjuster {
    config: AdjustmentConfig,
}

impl ThresholdAdjuster {
    pub fn new(config: AdjustmentConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AdjustmentConfig {
        &self.config
    }

    /// Classify whether `current` needs to move given the window statistics
    pub fn assess_need(&self, stats: &SummaryStats, current: f64) -> Option<AdjustmentNeed> {
        if stats.p90 > current * self.config.strict_ratio {
            Some(AdjustmentNeed::TooStrict)
        } else if stats.p99 < current * self.config.loose_ratio {
            Some(AdjustmentNeed::TooLoose)
        } else {
            None
        }
    }

    /// Suggested enforced value for a metric
    pub fn suggest(&self, metric: Metric, stats: &SummaryStats) -> f64 {
        let value = stats.p95 * self.config.margin(metric);
        match metric {
            Metric::CpuUsage | Metric::ErrorRate => value.min(100.0),
            _ => value,
        }
    }

    /// Run one adjustment round against `store`
    ///
    /// With fewer than `min_samples` samples, returns `success: false` and
    /// leaves the store untouched.
    pub fn adjust(
        &self,
        samples: &[MetricSample],
        store: &mut ThresholdStore,
        now: u64,
    ) -> AdjustmentResult {
        let start = Instant::now();
        let previous = store.state().current.clone();

        if samples.len() < self.config.min_samples {
            tracing::debug!(
                samples = samples.len(),
                required = self.config.min_samples,
                "skipping threshold adjustment"
            );
            return AdjustmentResult {
                success: false,
                reason: Some(format!(
                    "insufficient data: need at least {} samples, got {}",
                    self.config.min_samples,
                    samples.len()
                )),
                adjustments: Vec::new(),
                new_thresholds: previous.clone(),
                previous_thresholds: previous,
                confidence: 0.0,
                execution_time_ms: elapsed_ms(start),
                statistics: BTreeMap::new(),
            };
        }

        let mut statistics = BTreeMap::new();
        let mut adjustments = Vec::new();

        for metric in Metric::ADJUSTABLE {
            let series = MetricSample::series(samples, metric);
            let stats = match summarize(&series) {
                Ok(stats) => stats,
                Err(e) => {
                    tracing::warn!(%metric, error = %e, "statistics unavailable");
                    continue;
                }
            };
            statistics.insert(metric, stats);

            let old_value = store.current(metric);
            let Some(need) = self.assess_need(&stats, old_value) else {
                continue;
            };

            let new_value = self.suggest(metric, &stats);
            store.set_adaptive(metric, new_value);

            let change_ratio = if old_value != 0.0 {
                (new_value - old_value) / old_value
            } else {
                f64::INFINITY
            };
            let confidence = self.config.need_confidence;

            let mut rejections = Vec::new();
            if change_ratio.abs() > self.config.max_change_ratio {
                rejections.push(format!(
                    "change of {:.1}% exceeds {:.1}% limit",
                    change_ratio.abs() * 100.0,
                    self.config.max_change_ratio * 100.0
                ));
            }
            if confidence < self.config.min_confidence {
                rejections.push(format!(
                    "confidence {:.2} below {:.2}",
                    confidence, self.config.min_confidence
                ));
            }

            let reason = format!(
                "{} (p90={:.2}, p95={:.2}, p99={:.2})",
                need.describe(),
                stats.p90,
                stats.p95,
                stats.p99
            );
            let applied = rejections.is_empty();
            if applied {
                store.commit_adjustment(metric, new_value, reason.clone(), now);
                tracing::info!(%metric, old_value, new_value, "threshold adjusted");
            } else {
                tracing::info!(
                    %metric,
                    old_value,
                    new_value,
                    rejection = %rejections.join("; "),
                    "threshold adjustment rejected"
                );
            }

            adjustments.push(ThresholdAdjustment {
                metric,
                old_value,
                new_value,
                change_ratio,
                confidence,
                need,
                reason,
                applied,
                rejection: (!applied).then(|| rejections.join("; ")),
            });
        }

        let applied: Vec<f64> = adjustments
            .iter()
            .filter(|a| a.applied)
            .map(|a| a.confidence)
            .collect();
        let (reason, confidence) = if adjustments.is_empty() {
            store.set_confidence(self.config.stable_confidence);
            (
                Some("thresholds are adequate".to_string()),
                self.config.stable_confidence,
            )
        } else if applied.is_empty() {
            // Nothing moved, so the stored confidence still describes the
            // thresholds in force
            (Some("all suggested adjustments rejected".to_string()), 0.0)
        } else {
            let avg = applied.iter().sum::<f64>() / applied.len() as f64;
            store.set_confidence(avg);
            (None, avg)
        };

        AdjustmentResult {
            success: true,
            reason,
            adjustments,
            previous_thresholds: previous,
            new_thresholds: store.state().current.clone(),
            confidence,
            execution_time_ms: elapsed_ms(start),
            statistics,
        }
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::HistoryLedger;

    fn store_with(exec: f64, memory: f64, cpu: f64) -> ThresholdStore {
        let mut overrides = BTreeMap::new();
        overrides.insert(Metric::ExecutionTime, exec);
        overrides.insert(Metric::MemoryUsage, memory);
        overrides.insert(Metric::CpuUsage, cpu);
        ThresholdStore::new(
            ThresholdSet::with_overrides(&overrides),
            HistoryLedger::new(1000),
        )
    }

    fn samples(exec: impl Fn(usize) -> f64, n: usize) -> Vec<MetricSample> {
        (0..n)
            .map(|i| MetricSample {
                execution_time_ms: exec(i),
                memory_bytes: 700.0,
                cpu_percent: 50.0,
                error_rate_percent: 0.1,
                throughput_ops_per_sec: 100.0,
                timestamp: i as u64,
            })
            .collect()
    }

    #[test]
    fn test_insufficient_data_leaves_state() {
        let adjuster = ThresholdAdjuster::new(AdjustmentConfig::default());
        let mut store = store_with(100.0, 1000.0, 80.0);
        let before = store.state().clone();

        let result = adjuster.adjust(&samples(|_| 95.0, 9), &mut store, 1);

        assert!(!result.success);
        assert!(result.reason.unwrap().contains("insufficient data"));
        assert_eq!(store.state(), &before);
    }

    #[test]
    fn test_thresholds_adequate() {
        let adjuster = ThresholdAdjuster::new(AdjustmentConfig::default());
        // exec p90=70 <= 80, p99=70 >= 60; memory 700 vs 1000: p90 700 <= 800, p99 700 >= 600
        // cpu 50 vs 80: p90 50 <= 64, p99 50 >= 48
        let mut store = store_with(100.0, 1000.0, 80.0);
        let result = adjuster.adjust(&samples(|_| 70.0, 20), &mut store, 1);

        assert!(result.success);
        assert!(result.adjustments.is_empty());
        assert_eq!(result.reason.as_deref(), Some("thresholds are adequate"));
        assert_eq!(result.confidence, 0.9);
        assert_eq!(result.previous_thresholds, result.new_thresholds);
    }

    #[test]
    fn test_too_strict_adjusts_within_guard() {
        let adjuster = ThresholdAdjuster::new(AdjustmentConfig::default());
        let mut store = store_with(100.0, 1000.0, 80.0);
        // All exec samples at 90: p90 = 90 > 80 -> too strict; suggested 90 * 1.2 = 108 (+8%)
        let result = adjuster.adjust(&samples(|_| 90.0, 20), &mut store, 42);

        assert!(result.success);
        let exec = result
            .adjustments
            .iter()
            .find(|a| a.metric == Metric::ExecutionTime)
            .unwrap();
        assert_eq!(exec.need, AdjustmentNeed::TooStrict);
        assert!(exec.applied);
        assert!((exec.new_value - 108.0).abs() < 1e-9);
        assert!((store.current(Metric::ExecutionTime) - 108.0).abs() < 1e-9);
        assert_eq!(store.state().last_updated, 42);
        assert_eq!(store.history().len(), 1);
        assert_eq!(result.confidence, 0.8);
    }

    #[test]
    fn test_aggressive_adjustment_rejected_but_reported() {
        let adjuster = ThresholdAdjuster::new(AdjustmentConfig::default());
        let mut store = store_with(100.0, 1000.0, 80.0);
        // p99 = 20 < 60 -> too loose; suggested 24 is a 76% drop
        let result = adjuster.adjust(&samples(|_| 20.0, 20), &mut store, 1);

        let exec = result
            .adjustments
            .iter()
            .find(|a| a.metric == Metric::ExecutionTime)
            .unwrap();
        assert_eq!(exec.need, AdjustmentNeed::TooLoose);
        assert!(!exec.applied);
        assert!(exec.rejection.as_ref().unwrap().contains("exceeds"));
        assert_eq!(store.current(Metric::ExecutionTime), 100.0);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(
            result.reason.as_deref(),
            Some("all suggested adjustments rejected")
        );
        assert_eq!(store.state().confidence, 0.0);
        // The suggestion still lands in the adaptive set
        assert!((store.state().adaptive.get(Metric::ExecutionTime) - 24.0).abs() < 1e-9);
        assert!(store.history().is_empty());
    }

    #[test]
    fn test_memory_margin() {
        let adjuster = ThresholdAdjuster::new(AdjustmentConfig::default());
        // memory 700 vs limit 800: p90 700 > 640 -> too strict; 700 * 1.1 = 770 (-3.75%)
        let mut store = store_with(100.0, 800.0, 80.0);
        let result = adjuster.adjust(&samples(|_| 70.0, 10), &mut store, 1);
        let mem = result
            .adjustments
            .iter()
            .find(|a| a.metric == Metric::MemoryUsage)
            .unwrap();
        assert!(mem.applied);
        assert!((mem.new_value - 770.0).abs() < 1e-9);
    }

    #[test]
    fn test_cpu_suggestion_capped() {
        let adjuster = ThresholdAdjuster::new(AdjustmentConfig::default());
        let stats = summarize(&[95.0; 10]).unwrap();
        assert_eq!(adjuster.suggest(Metric::CpuUsage, &stats), 100.0);
    }

    #[test]
    fn test_low_confidence_rejected() {
        let config = AdjustmentConfig {
            need_confidence: 0.5,
            ..AdjustmentConfig::default()
        };
        let adjuster = ThresholdAdjuster::new(config);
        let mut store = store_with(100.0, 1000.0, 80.0);
        let result = adjuster.adjust(&samples(|_| 90.0, 20), &mut store, 1);
        assert!(result.adjustments.iter().all(|a| !a.applied));
        assert_eq!(result.confidence, 0.0);
        assert!(result.adjustments[0]
            .rejection
            .as_ref()
            .unwrap()
            .contains("confidence"));
    }

    #[test]
    fn test_report_string() {
        let adjuster = ThresholdAdjuster::new(AdjustmentConfig::default());
        let mut store = store_with(100.0, 1000.0, 80.0);
        let report = adjuster
            .adjust(&samples(|_| 90.0, 20), &mut store, 1)
            .to_report_string();
        assert!(report.contains("THRESHOLD ADJUSTMENT"));
        assert!(report.contains("executionTime"));

        let report = adjuster
            .adjust(&samples(|_| 90.0, 2), &mut store, 1)
            .to_report_string();
        assert!(report.contains("NO ADJUSTMENT"));
    }
}
