//! Engine facade owning all threshold, baseline and history state
//!
//! Every public operation returns a structured result. Persistence and
//! audit failures are logged and counted, never returned. Only
//! construction and baseline replacement can fail.
//!
//! # Example
//!
//! ```
//! use perfguard::audit::MemoryAuditSink;
//! use perfguard::config::EngineConfig;
//! use perfguard::engine::PerformanceEngine;
//! use perfguard::metrics::Metric;
//! use perfguard::thresholds::Violation;
//! use std::sync::Arc;
//!
//! let audit = Arc::new(MemoryAuditSink::new());
//! let mut engine = PerformanceEngine::open(EngineConfig::default(), audit.clone()).unwrap();
//!
//! let response = engine.handle_threshold_violation(Violation::new(Metric::CpuUsage, 95.0, 80.0));
//! assert!(!response.actions.is_empty());
//! assert_eq!(engine.response_history().len(), 1);
//! ```

use crate::adjuster::{AdjustmentResult, ThresholdAdjuster};
use crate::anomaly::{Anomaly, AnomalyDetector};
use crate::audit::{AlertRecord, AlertSeverity, AuditSink};
use crate::baseline::{Baseline, BaselineError, BaselineStore};
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, EngineConfig};
use crate::degradation::{DegradationDetector, DegradationResult, DegradationSeverity};
use crate::ledger::HistoryLedger;
use crate::metrics::{Metric, MetricSample};
use crate::persistence::{self, PersistenceWriter, WriterStats};
use crate::response::{
    ActionType, AutoResponseOrchestrator, LoggingHooks, RemediationHooks, ResponseContext,
    ResponseHistoryEntry, ResponseResult, ViolationStatistics,
};
use crate::thresholds::{
    AdjustmentRecord, ThresholdOverride, ThresholdSet, ThresholdSnapshot, ThresholdState,
    ThresholdStore, Violation,
};
use crate::trend::{TrendAnalyzer, TrendResult};
use serde::Serialize;
use serde_json::json;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Errors from engine construction and baseline replacement
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Baseline(#[from] BaselineError),
}

/// Operation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStats {
    pub adjustment_rounds: u64,
    pub adjustments_applied: u64,
    pub adjustments_rejected: u64,
    pub degradation_checks: u64,
    pub degradations_detected: u64,
    pub anomalies_detected: u64,
    pub violations_handled: u64,
    pub follow_ups_required: u64,
    pub overrides_expired: u64,
    pub audit_failures: u64,
}

/// Adaptive threshold and degradation-response engine
pub struct PerformanceEngine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
    hooks: Arc<dyn RemediationHooks>,
    baselines: BaselineStore,
    thresholds: ThresholdStore,
    adjuster: ThresholdAdjuster,
    trends: TrendAnalyzer,
    anomalies: AnomalyDetector,
    degradation: DegradationDetector,
    responder: AutoResponseOrchestrator,
    window: VecDeque<MetricSample>,
    responses: HistoryLedger<ResponseHistoryEntry>,
    violation_stats: ViolationStatistics,
    writer: PersistenceWriter,
    stats: EngineStats,
}

impl PerformanceEngine {
    /// Build an engine, restoring persisted state from `config.storage`
    ///
    /// Missing or unreadable documents fall back to defaults.
    pub fn open(config: EngineConfig, audit: Arc<dyn AuditSink>) -> Result<Self, EngineError> {
        config.validate().map_err(ConfigError::Invalid)?;
        let overrides = config.threshold_overrides().map_err(ConfigError::Invalid)?;

        let history_entries = config
            .storage
            .adjustment_history_path()
            .and_then(|p| persistence::load_or_default::<Vec<AdjustmentRecord>>(&p))
            .unwrap_or_default();
        let history =
            HistoryLedger::from_entries(config.history.adjustment_capacity, history_entries);

        let response_entries = config
            .storage
            .response_history_path()
            .and_then(|p| persistence::load_or_default::<Vec<ResponseHistoryEntry>>(&p))
            .unwrap_or_default();
        let responses =
            HistoryLedger::from_entries(config.history.response_capacity, response_entries);

        let baselines = match config.storage.baseline_path() {
            Some(path) => BaselineStore::load(&path),
            None => BaselineStore::default(),
        };

        let thresholds = ThresholdStore::restore(ThresholdSet::with_overrides(&overrides), history);
        tracing::info!(
            thresholds = %thresholds.state().current,
            history = thresholds.history().len(),
            responses = responses.len(),
            "performance engine ready"
        );

        Ok(Self {
            adjuster: ThresholdAdjuster::new(config.adjustment.clone()),
            trends: TrendAnalyzer::new(config.trend.clone()),
            anomalies: AnomalyDetector::new(config.anomaly.clone()),
            degradation: DegradationDetector::new(config.degradation.clone()),
            responder: AutoResponseOrchestrator::new(config.response.clone()),
            window: VecDeque::with_capacity(config.degradation.window_capacity),
            writer: PersistenceWriter::new(config.storage.write_mode),
            clock: Arc::new(SystemClock),
            hooks: Arc::new(LoggingHooks),
            violation_stats: ViolationStatistics::default(),
            stats: EngineStats::default(),
            baselines,
            thresholds,
            responses,
            audit,
            config,
        })
    }

    /// Replace the remediation hooks
    pub fn with_hooks(mut self, hooks: Arc<dyn RemediationHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one statistical adjustment round over `samples`
    ///
    /// Below the minimum sample count nothing is touched, not even expired
    /// overrides.
    pub fn adjust_thresholds_dynamically(&mut self, samples: &[MetricSample]) -> AdjustmentResult {
        let now = self.clock.now_ms();
        if samples.len() >= self.adjuster.config().min_samples {
            self.expire_at(now);
        }

        let result = self.adjuster.adjust(samples, &mut self.thresholds, now);
        if !result.success {
            return result;
        }

        self.stats.adjustment_rounds += 1;
        let applied = result.applied_count() as u64;
        self.stats.adjustments_applied += applied;
        self.stats.adjustments_rejected += result.adjustments.len() as u64 - applied;

        if applied > 0 {
            self.persist_adjustment_history();
            let alert = AlertRecord::new(
                "threshold_adjustment",
                AlertSeverity::Info,
                format!("{} threshold(s) adjusted", applied),
                now,
                json!({
                    "previous": result.previous_thresholds,
                    "current": result.new_thresholds,
                }),
            );
            self.emit(alert);
        }
        result
    }

    /// Record `sample` in the recent window and check it for degradation
    pub fn detect_degradation(&mut self, sample: MetricSample) -> DegradationResult {
        let now = self.clock.now_ms();
        self.expire_at(now);
        self.record_sample(sample);

        let trends = self.trends.analyze_history(self.window.make_contiguous());
        let result = self.degradation.detect(&sample, &self.baselines, &trends);
        self.stats.degradation_checks += 1;

        if result.detected {
            self.stats.degradations_detected += 1;
            tracing::warn!(
                severity = %result.severity,
                indicators = result.indicators.len(),
                confidence = result.confidence,
                "performance degradation detected"
            );
            let alert = AlertRecord::new(
                "performance_degradation",
                degradation_alert_severity(result.severity),
                format!(
                    "Performance degradation detected ({} indicators)",
                    result.indicators.len()
                ),
                now,
                serde_json::to_value(sample).unwrap_or_default(),
            )
            .with_details(json!({
                "indicators": result.indicators,
                "recommendations": result.recommendations,
                "confidence": result.confidence,
            }));
            self.emit(alert);
        }
        result
    }

    /// Trend per metric over a caller-supplied history
    pub fn analyze_trends(&self, history: &[MetricSample]) -> Vec<TrendResult> {
        self.trends.analyze_history(history)
    }

    /// Z-score outliers in `samples`
    pub fn detect_anomalies(&mut self, samples: &[MetricSample]) -> Vec<Anomaly> {
        let anomalies = self.anomalies.detect(samples);
        self.stats.anomalies_detected += anomalies.len() as u64;
        anomalies
    }

    /// Assess, plan and execute the response to a violation
    pub fn handle_threshold_violation(&mut self, violation: Violation) -> ResponseResult {
        let now = self.clock.now_ms();
        self.expire_at(now);

        let audit = Arc::clone(&self.audit);
        let hooks = Arc::clone(&self.hooks);
        let window = self.window.make_contiguous();
        let mut ctx = ResponseContext {
            store: &mut self.thresholds,
            window,
            statistics: &mut self.violation_stats,
            audit: audit.as_ref(),
            hooks: hooks.as_ref(),
            now,
        };
        let response = self.responder.respond(&violation, &mut ctx);

        // log_violation and immediate_alert only fail through the audit sink
        self.stats.audit_failures += response
            .actions
            .iter()
            .filter(|a| {
                !a.success
                    && matches!(
                        a.action.action_type,
                        ActionType::LogViolation | ActionType::ImmediateAlert
                    )
            })
            .count() as u64;
        self.stats.violations_handled += 1;
        if response.follow_up_required {
            self.stats.follow_ups_required += 1;
        }

        self.responses.append(ResponseHistoryEntry {
            timestamp: now,
            effectiveness: response.effectiveness,
            violation,
            response: response.clone(),
        });
        self.persist_response_history();
        response
    }

    /// Violations of the enforced thresholds by `sample`
    pub fn check_sample(&mut self, sample: &MetricSample) -> Vec<Violation> {
        let now = self.clock.now_ms();
        self.expire_at(now);
        self.thresholds.check_sample(sample)
    }

    /// Push a sample into the bounded recent window without analysis
    pub fn record_sample(&mut self, sample: MetricSample) {
        let capacity = self.config.degradation.window_capacity;
        while self.window.len() >= capacity {
            self.window.pop_front();
        }
        self.window.push_back(sample);
    }

    /// Swap in recalculated baselines; the store is unchanged on error
    pub fn replace_baselines(
        &mut self,
        baselines: BTreeMap<Metric, Baseline>,
    ) -> Result<(), EngineError> {
        self.baselines.replace(baselines)?;
        if let Some(path) = self.config.storage.baseline_path() {
            match self.baselines.to_json() {
                Ok(bytes) => self.writer.submit(path, bytes),
                Err(e) => tracing::warn!(error = %e, "failed to serialize baselines"),
            }
        }
        Ok(())
    }

    /// Revert temporary overrides whose TTL has lapsed
    pub fn expire_overrides(&mut self) -> Vec<ThresholdOverride> {
        let now = self.clock.now_ms();
        self.expire_at(now)
    }

    pub fn thresholds(&self) -> ThresholdSnapshot {
        self.thresholds.snapshot()
    }

    pub fn state(&self) -> &ThresholdState {
        self.thresholds.state()
    }

    pub fn baselines(&self) -> &BaselineStore {
        &self.baselines
    }

    pub fn window(&self) -> impl Iterator<Item = &MetricSample> {
        self.window.iter()
    }

    pub fn adjustment_history(&self) -> Vec<AdjustmentRecord> {
        self.thresholds.history().to_vec()
    }

    pub fn response_history(&self) -> Vec<ResponseHistoryEntry> {
        self.responses.to_vec()
    }

    pub fn violation_statistics(&self) -> &ViolationStatistics {
        &self.violation_stats
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn persistence_stats(&self) -> WriterStats {
        self.writer.stats()
    }

    /// Wait for every queued persistence write to be attempted
    pub fn flush(&self) {
        self.writer.flush();
    }

    fn expire_at(&mut self, now: u64) -> Vec<ThresholdOverride> {
        let expired = self.thresholds.expire_overrides(now);
        self.stats.overrides_expired += expired.len() as u64;
        expired
    }

    fn emit(&mut self, alert: AlertRecord) {
        if let Err(e) = self.audit.record(alert) {
            self.stats.audit_failures += 1;
            tracing::warn!(error = %e, "audit sink rejected alert");
        }
    }

    fn persist_adjustment_history(&self) {
        let Some(path) = self.config.storage.adjustment_history_path() else {
            return;
        };
        match self.thresholds.history().to_json() {
            Ok(bytes) => self.writer.submit(path, bytes),
            Err(e) => tracing::warn!(error = %e, "failed to serialize adjustment history"),
        }
    }

    fn persist_response_history(&self) {
        let Some(path) = self.config.storage.response_history_path() else {
            return;
        };
        match self.responses.to_json() {
            Ok(bytes) => self.writer.submit(path, bytes),
            Err(e) => tracing::warn!(error = %e, "failed to serialize response history"),
        }
    }
}

fn degradation_alert_severity(severity: DegradationSeverity) -> AlertSeverity {
    match severity {
        DegradationSeverity::None => AlertSeverity::Info,
        DegradationSeverity::Low => AlertSeverity::Low,
        DegradationSeverity::Medium => AlertSeverity::Medium,
        DegradationSeverity::High => AlertSeverity::High,
        DegradationSeverity::Critical => AlertSeverity::Critical,
    }
}

/// Cloneable handle serializing every entry point through one mutex
#[derive(Clone)]
pub struct SharedEngine {
    inner: Arc<Mutex<PerformanceEngine>>,
}

impl SharedEngine {
    pub fn new(engine: PerformanceEngine) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    /// Exclusive access; a poisoned lock is recovered since every
    /// operation leaves the state consistent before it can panic
    pub fn lock(&self) -> MutexGuard<'_, PerformanceEngine> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn adjust_thresholds_dynamically(&self, samples: &[MetricSample]) -> AdjustmentResult {
        self.lock().adjust_thresholds_dynamically(samples)
    }

    pub fn detect_degradation(&self, sample: MetricSample) -> DegradationResult {
        self.lock().detect_degradation(sample)
    }

    pub fn analyze_trends(&self, history: &[MetricSample]) -> Vec<TrendResult> {
        self.lock().analyze_trends(history)
    }

    pub fn detect_anomalies(&self, samples: &[MetricSample]) -> Vec<Anomaly> {
        self.lock().detect_anomalies(samples)
    }

    pub fn handle_threshold_violation(&self, violation: Violation) -> ResponseResult {
        self.lock().handle_threshold_violation(violation)
    }

    pub fn check_sample(&self, sample: &MetricSample) -> Vec<Violation> {
        self.lock().check_sample(sample)
    }

    pub fn thresholds(&self) -> ThresholdSnapshot {
        self.lock().thresholds()
    }

    pub fn stats(&self) -> EngineStats {
        self.lock().stats()
    }
}
