// Degradation detection: baseline deviation fused with trend evidence
//
// Baseline indicator: deviation = (current - mean) / mean (oriented so that
// positive means worse) above deviation_threshold AND significance of the
// z-score not low. Critical when significance is high.
//
// Trend indicator: direction degrading with |r| above trend_confidence.
// Critical when the slope exceeds critical_slope.
//
// Rollup: critical if any indicator is critical, then high / medium by the
// number of warnings, low for a single warning, none without indicators.

use crate::baseline::BaselineStore;
use crate::config::DegradationConfig;
use crate::metrics::{Metric, MetricSample};
use crate::trend::{TrendDirection, TrendResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Statistical significance of a baseline deviation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Significance {
    Low,
    Medium,
    High,
}

/// Kind of evidence behind an indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorType {
    BaselineDeviation,
    TrendDegradation,
}

/// Severity of a single indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorSeverity {
    Warning,
    Critical,
}

/// Overall severity of a detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DegradationSeverity {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for DegradationSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DegradationSeverity::None => "none",
            DegradationSeverity::Low => "low",
            DegradationSeverity::Medium => "medium",
            DegradationSeverity::High => "high",
            DegradationSeverity::Critical => "critical",
        })
    }
}

/// Evidence that a metric is worsening
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DegradationIndicator {
    pub metric: Metric,
    #[serde(rename = "type")]
    pub indicator_type: IndicatorType,
    pub severity: IndicatorSeverity,
    pub value: f64,
    pub baseline: f64,
    /// Relative worsening (baseline indicators) or first-to-last relative
    /// change (trend indicators)
    pub deviation: f64,
    pub description: String,
}

/// Result of one detection call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DegradationResult {
    pub detected: bool,
    pub severity: DegradationSeverity,
    pub indicators: Vec<DegradationIndicator>,
    pub confidence: f64,
    pub recommendations: Vec<String>,
    pub timestamp: u64,
}

impl DegradationResult {
    /// Generate human-readable report
    pub fn to_report_string(&self) -> String {
        let mut report = String::new();
        if !self.detected {
            report.push_str("✅ NO DEGRADATION DETECTED\n");
            return report;
        }

        report.push_str(&format!(
            "❌ DEGRADATION DETECTED (severity: {}, confidence: {:.2})\n\n",
            self.severity, self.confidence
        ));
        report.push_str("📊 Indicators:\n");
        for ind in &self.indicators {
            let icon = match ind.severity {
                IndicatorSeverity::Critical => "🔴",
                IndicatorSeverity::Warning => "🟡",
            };
            report.push_str(&format!("  {} {}\n", icon, ind.description));
        }
        if !self.recommendations.is_empty() {
            report.push_str("\n💡 Recommendations:\n");
            for rec in &self.recommendations {
                report.push_str(&format!("  - {}\n", rec));
            }
        }
        report
    }
}

/// Fixed remediation advice per metric
pub fn recommendation(metric: Metric) -> &'static str {
    match metric {
        Metric::ExecutionTime => {
            "executionTime: consider algorithmic optimization or caching of hot paths"
        }
        Metric::MemoryUsage => {
            "memoryUsage: look for leaks, unbounded caches, or oversized buffers"
        }
        Metric::CpuUsage => "cpuUsage: profile hot loops and move heavy work off the request path",
        Metric::ErrorRate => "errorRate: inspect recent deployments and failing dependencies",
        Metric::Throughput => {
            "throughput: check for contention, saturation, or reduced concurrency"
        }
    }
}

const SYSTEM_WIDE_REVIEW: &str =
    "Multiple metrics degraded: perform a system-wide performance review";

/// Pure fusion of baseline deviation and trend evidence
#[derive(Debug, Clone)]
pub struct DegradationDetector {
    config: DegradationConfig,
}

impl DegradationDetector {
    pub fn new(config: DegradationConfig) -> Self {
        Self { config }
    }

    /// Significance of a z-score; `None` (zero stddev) counts as high when
    /// the value differs from the mean
    pub fn significance(&self, z: Option<f64>, differs: bool) -> Significance {
        match z {
            Some(z) if z > self.config.high_significance_z => Significance::High,
            Some(z) if z > self.config.medium_significance_z => Significance::Medium,
            Some(_) => Significance::Low,
            None if differs => Significance::High,
            None => Significance::Low,
        }
    }

    fn baseline_indicator(
        &self,
        metric: Metric,
        value: f64,
        baselines: &BaselineStore,
    ) -> Option<DegradationIndicator> {
        let baseline = baselines.get(metric)?;
        let deviation = baseline.deviation(metric, value)?;
        let significance = self.significance(baseline.z_score(value), value != baseline.mean);

        if deviation <= self.config.deviation_threshold || significance == Significance::Low {
            return None;
        }

        let severity = if significance == Significance::High {
            IndicatorSeverity::Critical
        } else {
            IndicatorSeverity::Warning
        };
        Some(DegradationIndicator {
            metric,
            indicator_type: IndicatorType::BaselineDeviation,
            severity,
            value,
            baseline: baseline.mean,
            deviation,
            description: format!(
                "{} at {:.2} {} is {:.1}% worse than baseline {:.2}",
                metric,
                value,
                metric.unit(),
                deviation * 100.0,
                baseline.mean
            ),
        })
    }

    fn trend_indicator(&self, trend: &TrendResult) -> Option<DegradationIndicator> {
        if trend.direction != TrendDirection::Degrading
            || trend.confidence <= self.config.trend_confidence
        {
            return None;
        }
        let severity = if trend.slope.abs() > self.config.critical_slope {
            IndicatorSeverity::Critical
        } else {
            IndicatorSeverity::Warning
        };
        Some(DegradationIndicator {
            metric: trend.metric,
            indicator_type: IndicatorType::TrendDegradation,
            severity,
            value: trend.current_value,
            baseline: trend.baseline_value,
            deviation: trend.relative_change().unwrap_or(trend.slope),
            description: format!(
                "{} trending worse: slope {:+.4} per sample (confidence {:.2})",
                trend.metric, trend.slope, trend.confidence
            ),
        })
    }

    /// Roll indicator severities up into an overall severity
    pub fn rollup(indicators: &[DegradationIndicator]) -> DegradationSeverity {
        if indicators.is_empty() {
            return DegradationSeverity::None;
        }
        if indicators
            .iter()
            .any(|i| i.severity == IndicatorSeverity::Critical)
        {
            return DegradationSeverity::Critical;
        }
        match indicators.len() {
            n if n >= 3 => DegradationSeverity::High,
            2 => DegradationSeverity::Medium,
            _ => DegradationSeverity::Low,
        }
    }

    /// min(0.9, 0.5 + avg|deviation| * 0.5 + critical_ratio * 0.3); 0 without indicators
    pub fn confidence(indicators: &[DegradationIndicator]) -> f64 {
        if indicators.is_empty() {
            return 0.0;
        }
        let n = indicators.len() as f64;
        let avg_abs_deviation = indicators.iter().map(|i| i.deviation.abs()).sum::<f64>() / n;
        let critical_ratio = indicators
            .iter()
            .filter(|i| i.severity == IndicatorSeverity::Critical)
            .count() as f64
            / n;
        (0.5 + avg_abs_deviation * 0.5 + critical_ratio * 0.3).min(0.9)
    }

    fn recommendations(indicators: &[DegradationIndicator]) -> Vec<String> {
        let mut metrics: Vec<Metric> = indicators.iter().map(|i| i.metric).collect();
        metrics.sort();
        metrics.dedup();

        let mut recs: Vec<String> = metrics
            .into_iter()
            .map(|m| recommendation(m).to_string())
            .collect();
        if indicators.len() > 2 {
            recs.push(SYSTEM_WIDE_REVIEW.to_string());
        }
        recs
    }

    /// Compare `sample` against baselines and fold in trend evidence
    pub fn detect(
        &self,
        sample: &MetricSample,
        baselines: &BaselineStore,
        trends: &[TrendResult],
    ) -> DegradationResult {
        let mut indicators: Vec<DegradationIndicator> = Metric::ALL
            .iter()
            .filter_map(|m| self.baseline_indicator(*m, sample.value(*m), baselines))
            .collect();
        indicators.extend(trends.iter().filter_map(|t| self.trend_indicator(t)));

        let severity = Self::rollup(&indicators);
        DegradationResult {
            detected: !indicators.is_empty(),
            severity,
            confidence: Self::confidence(&indicators),
            recommendations: Self::recommendations(&indicators),
            indicators,
            timestamp: sample.timestamp,
        }
    }
}
