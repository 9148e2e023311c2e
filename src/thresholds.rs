//! Enforced and adaptive threshold sets
//!
//! Two write paths touch `current`:
//!
//! - [`ThresholdStore::commit_adjustment`]: a statistically justified move made
//!   by the adjuster. It is recorded in the bounded adjustment history.
//! - [`ThresholdStore::apply_override`]: a temporary relaxation requested by
//!   the response orchestrator. It remembers the value it displaced and is
//!   reverted by [`ThresholdStore::expire_overrides`] once its TTL lapses. A
//!   later committed adjustment on the same metric supersedes the override.
//!
//! No API removes a metric, so every metric in [`DEFAULT_THRESHOLDS`] always
//! has a value in `current`.

use crate::ledger::HistoryLedger;
use crate::metrics::{Metric, MetricSample};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Built-in enforced limits
///
/// Throughput is a floor (breached when the value drops below it); the rest
/// are ceilings.
pub const DEFAULT_THRESHOLDS: [(Metric, f64); 5] = [
    (Metric::ExecutionTime, 5000.0),
    (Metric::MemoryUsage, 512.0 * 1024.0 * 1024.0),
    (Metric::CpuUsage, 80.0),
    (Metric::ErrorRate, 5.0),
    (Metric::Throughput, 10.0),
];

/// Mapping metric → numeric limit, always covering every metric
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ThresholdSet(BTreeMap<Metric, f64>);

impl Default for ThresholdSet {
    fn default() -> Self {
        Self(DEFAULT_THRESHOLDS.iter().copied().collect())
    }
}

impl ThresholdSet {
    /// Defaults with selected metrics overridden
    pub fn with_overrides(overrides: &BTreeMap<Metric, f64>) -> Self {
        let mut set = Self::default();
        for (metric, value) in overrides {
            set.set(*metric, *value);
        }
        set
    }

    pub fn get(&self, metric: Metric) -> f64 {
        // Seeded from DEFAULT_THRESHOLDS and never shrunk
        self.0.get(&metric).copied().unwrap_or_else(|| default_threshold(metric))
    }

    pub fn set(&mut self, metric: Metric, value: f64) {
        self.0.insert(metric, value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, f64)> + '_ {
        self.0.iter().map(|(m, v)| (*m, *v))
    }
}

fn default_threshold(metric: Metric) -> f64 {
    DEFAULT_THRESHOLDS
        .iter()
        .find(|(m, _)| *m == metric)
        .map(|(_, v)| *v)
        .unwrap_or(f64::INFINITY)
}

impl fmt::Display for ThresholdSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .iter()
            .map(|(m, v)| format!("{}={:.2}", m, v))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

/// One committed threshold move
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentRecord {
    pub timestamp: u64,
    pub metric: Metric,
    pub old_value: f64,
    pub new_value: f64,
    pub reason: String,
}

/// Temporary relaxation installed by a response action
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdOverride {
    pub metric: Metric,
    /// Value enforced while the override is active
    pub value: f64,
    /// Statistically managed value restored on expiry
    pub displaced: f64,
    pub applied_at: u64,
    pub expires_at: u64,
}

/// Threshold state owned by the store
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdState {
    pub current: ThresholdSet,
    pub adaptive: ThresholdSet,
    /// Confidence of the latest adjustment round, in [0, 1]
    pub confidence: f64,
    pub last_updated: u64,
    pub adjustment_history: HistoryLedger<AdjustmentRecord>,
}

/// Serializable view of the threshold state
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdSnapshot {
    pub current: ThresholdSet,
    pub adaptive: ThresholdSet,
    pub confidence: f64,
    pub last_updated: u64,
    pub history_len: usize,
    pub overrides: Vec<ThresholdOverride>,
}

/// Sample value exceeding an enforced limit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub metric: Metric,
    pub value: f64,
    pub threshold: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<ViolationSeverity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
}

impl Violation {
    pub fn new(metric: Metric, value: f64, threshold: f64) -> Self {
        Self {
            metric,
            value,
            threshold,
            severity: None,
            operation_id: None,
        }
    }

    pub fn with_severity(mut self, severity: ViolationSeverity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_operation_id(mut self, id: impl Into<String>) -> Self {
        self.operation_id = Some(id.into());
        self
    }
}

/// Severity of a threshold violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ViolationSeverity::Low => "low",
            ViolationSeverity::Medium => "medium",
            ViolationSeverity::High => "high",
            ViolationSeverity::Critical => "critical",
        })
    }
}

/// Single-writer owner of [`ThresholdState`]
#[derive(Debug, Clone)]
pub struct ThresholdStore {
    state: ThresholdState,
    overrides: BTreeMap<Metric, ThresholdOverride>,
}

impl ThresholdStore {
    /// Create a store enforcing `initial`, seeded with persisted history
    pub fn new(initial: ThresholdSet, history: HistoryLedger<AdjustmentRecord>) -> Self {
        Self {
            state: ThresholdState {
                adaptive: initial.clone(),
                current: initial,
                confidence: 0.0,
                last_updated: 0,
                adjustment_history: history,
            },
            overrides: BTreeMap::new(),
        }
    }

    /// Create a store and replay persisted history on top of `initial`
    ///
    /// The newest record per metric determines its enforced value, so a
    /// restart resumes from the last committed adjustment.
    pub fn restore(initial: ThresholdSet, history: HistoryLedger<AdjustmentRecord>) -> Self {
        let mut current = initial;
        let mut last_updated = 0;
        for record in history.iter() {
            current.set(record.metric, record.new_value);
            last_updated = last_updated.max(record.timestamp);
        }
        let mut store = Self::new(current, history);
        store.state.last_updated = last_updated;
        store
    }

    pub fn state(&self) -> &ThresholdState {
        &self.state
    }

    pub fn current(&self, metric: Metric) -> f64 {
        self.state.current.get(metric)
    }

    /// Value in force once every active override for `metric` has expired
    pub fn managed(&self, metric: Metric) -> f64 {
        self.overrides
            .get(&metric)
            .map(|o| o.displaced)
            .unwrap_or_else(|| self.state.current.get(metric))
    }

    pub fn history(&self) -> &HistoryLedger<AdjustmentRecord> {
        &self.state.adjustment_history
    }

    pub fn snapshot(&self) -> ThresholdSnapshot {
        ThresholdSnapshot {
            current: self.state.current.clone(),
            adaptive: self.state.adaptive.clone(),
            confidence: self.state.confidence,
            last_updated: self.state.last_updated,
            history_len: self.state.adjustment_history.len(),
            overrides: self.active_overrides(),
        }
    }

    /// Commit a statistically justified threshold move
    pub fn commit_adjustment(
        &mut self,
        metric: Metric,
        new_value: f64,
        reason: impl Into<String>,
        now: u64,
    ) -> AdjustmentRecord {
        if self.overrides.remove(&metric).is_some() {
            tracing::debug!(%metric, "committed adjustment supersedes temporary override");
        }
        let record = AdjustmentRecord {
            timestamp: now,
            metric,
            old_value: self.state.current.get(metric),
            new_value,
            reason: reason.into(),
        };
        self.state.current.set(metric, new_value);
        self.state.last_updated = now;
        self.state.adjustment_history.append(record.clone());
        record
    }

    pub fn set_adaptive(&mut self, metric: Metric, value: f64) {
        self.state.adaptive.set(metric, value);
    }

    pub fn set_confidence(&mut self, confidence: f64) {
        self.state.confidence = confidence.clamp(0.0, 1.0);
    }

    /// Install a temporary enforced value that reverts after `ttl_ms`
    ///
    /// Stacked overrides keep the originally displaced value, so expiry
    /// always returns to the statistically managed threshold.
    pub fn apply_override(
        &mut self,
        metric: Metric,
        value: f64,
        now: u64,
        ttl_ms: u64,
    ) -> ThresholdOverride {
        let displaced = self.managed(metric);
        let ov = ThresholdOverride {
            metric,
            value,
            displaced,
            applied_at: now,
            expires_at: now.saturating_add(ttl_ms),
        };
        self.state.current.set(metric, value);
        self.overrides.insert(metric, ov);
        tracing::info!(
            %metric,
            value,
            displaced,
            expires_at = ov.expires_at,
            "temporary threshold override applied"
        );
        ov
    }

    /// Revert every override whose TTL has lapsed at `now`
    pub fn expire_overrides(&mut self, now: u64) -> Vec<ThresholdOverride> {
        let expired: Vec<Metric> = self
            .overrides
            .values()
            .filter(|o| o.expires_at <= now)
            .map(|o| o.metric)
            .collect();

        let mut reverted = Vec::with_capacity(expired.len());
        for metric in expired {
            if let Some(ov) = self.overrides.remove(&metric) {
                self.state.current.set(metric, ov.displaced);
                tracing::info!(%metric, restored = ov.displaced, "threshold override expired");
                reverted.push(ov);
            }
        }
        reverted
    }

    pub fn active_overrides(&self) -> Vec<ThresholdOverride> {
        self.overrides.values().copied().collect()
    }

    /// Violations of the enforced thresholds by one sample
    pub fn check_sample(&self, sample: &MetricSample) -> Vec<Violation> {
        self.state
            .current
            .iter()
            .filter_map(|(metric, threshold)| {
                let value = sample.value(metric);
                metric
                    .breaches(value, threshold)
                    .then(|| Violation::new(metric, value, threshold))
            })
            .collect()
    }
}
