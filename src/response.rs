//! Automated response to threshold violations
//!
//! Each violation is handled independently:
//!
//! 1. Assess severity from `value / threshold` (a severity supplied on the
//!    violation wins).
//! 2. Select actions from a fixed table keyed by severity, always starting
//!    with `log_violation`.
//! 3. Execute every action in ascending priority order. A failing handler
//!    produces a failed [`ActionResult`]; the sequence never stops early.
//! 4. Score effectiveness and decide whether follow-up is required.
//!
//! # Example
//!
//! ```
//! use perfguard::metrics::Metric;
//! use perfguard::response::AutoResponseOrchestrator;
//! use perfguard::thresholds::{Violation, ViolationSeverity};
//! use perfguard::config::ResponseConfig;
//!
//! let orchestrator = AutoResponseOrchestrator::new(ResponseConfig::default());
//! let violation = Violation::new(Metric::ExecutionTime, 17_500.0, 5_000.0);
//! assert_eq!(orchestrator.assess_severity(&violation), ViolationSeverity::Critical);
//! ```

use crate::audit::{AlertRecord, AlertSeverity, AuditError, AuditSink};
use crate::config::ResponseConfig;
use crate::metrics::{Metric, MetricSample};
use crate::statistics::summarize;
use crate::thresholds::{ThresholdStore, Violation, ViolationSeverity};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;
use thiserror::Error;

/// Errors raised by an action handler
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("unknown action type")]
    UnknownAction,

    #[error("Audit sink rejected alert: {0}")]
    Audit(#[from] AuditError),

    #[error("Remediation hook failed: {0}")]
    Hook(String),

    #[error("Invalid action parameter: {0}")]
    InvalidParameter(String),
}

/// Remediation action kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    LogViolation,
    ImmediateAlert,
    ThrottleRequests,
    SendNotification,
    AdjustThreshold,
    CollectDiagnostics,
    UpdateStatistics,
    /// Any action name this build does not know
    #[serde(other)]
    Unknown,
}

impl ActionType {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::LogViolation => "log_violation",
            ActionType::ImmediateAlert => "immediate_alert",
            ActionType::ThrottleRequests => "throttle_requests",
            ActionType::SendNotification => "send_notification",
            ActionType::AdjustThreshold => "adjust_threshold",
            ActionType::CollectDiagnostics => "collect_diagnostics",
            ActionType::UpdateStatistics => "update_statistics",
            ActionType::Unknown => "unknown",
        }
    }

    /// Effectiveness bonus earned when this action succeeds
    pub fn weight(self) -> f64 {
        match self {
            ActionType::ImmediateAlert => 0.30,
            ActionType::ThrottleRequests => 0.25,
            ActionType::AdjustThreshold => 0.20,
            ActionType::SendNotification => 0.15,
            ActionType::CollectDiagnostics => 0.10,
            _ => 0.05,
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional knobs carried by an action
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throttle_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factor: Option<f64>,
}

/// One planned remediation step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseAction {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    /// 1 is highest
    pub priority: u8,
    #[serde(default)]
    pub parameters: ActionParameters,
}

impl ResponseAction {
    pub fn new(action_type: ActionType, priority: u8) -> Self {
        Self {
            action_type,
            priority,
            parameters: ActionParameters::default(),
        }
    }

    pub fn with_throttle_rate(mut self, rate: f64) -> Self {
        self.parameters.throttle_rate = Some(rate);
        self
    }

    pub fn with_factor(mut self, factor: f64) -> Self {
        self.parameters.factor = Some(factor);
        self
    }
}

/// Outcome of one executed action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub action: ResponseAction,
    pub success: bool,
    pub execution_time_ms: f64,
    pub details: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate outcome for one violation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseResult {
    pub severity: ViolationSeverity,
    pub actions: Vec<ActionResult>,
    pub effectiveness: f64,
    pub follow_up_required: bool,
    pub execution_time_ms: f64,
}

impl ResponseResult {
    pub fn success_count(&self) -> usize {
        self.actions.iter().filter(|a| a.success).count()
    }

    /// Generate human-readable report
    pub fn to_report_string(&self) -> String {
        let mut report = String::new();
        report.push_str(&format!(
            "🚨 VIOLATION RESPONSE (severity: {})\n\n",
            self.severity
        ));
        for result in &self.actions {
            let icon = if result.success { "✅" } else { "❌" };
            report.push_str(&format!(
                "  {} [p{}] {}",
                icon, result.action.priority, result.action.action_type
            ));
            if let Some(err) = &result.error {
                report.push_str(&format!(" ({})", err));
            }
            report.push('\n');
        }
        report.push_str(&format!(
            "\n📊 Effectiveness: {:.2} ({}/{} actions succeeded)\n",
            self.effectiveness,
            self.success_count(),
            self.actions.len()
        ));
        if self.follow_up_required {
            report.push_str("⚠️  Follow-up required\n");
        }
        report
    }
}

/// One ledger entry per handled violation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseHistoryEntry {
    pub timestamp: u64,
    pub violation: Violation,
    pub response: ResponseResult,
    pub effectiveness: f64,
}

/// Counters maintained by the `update_statistics` action
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationStatistics {
    pub total: u64,
    pub by_metric: BTreeMap<Metric, u64>,
    pub by_severity: BTreeMap<ViolationSeverity, u64>,
}

impl ViolationStatistics {
    pub fn record(&mut self, metric: Metric, severity: ViolationSeverity) {
        self.total += 1;
        *self.by_metric.entry(metric).or_insert(0) += 1;
        *self.by_severity.entry(severity).or_insert(0) += 1;
    }
}

/// External remediation capabilities
pub trait RemediationHooks: Send + Sync {
    /// Shed load for `metric` at `rate` (fraction of requests admitted)
    fn throttle(&self, metric: Metric, rate: f64) -> Result<(), String>;

    /// Page or message the on-call channel
    fn notify(&self, severity: ViolationSeverity, message: &str) -> Result<(), String>;
}

/// Hooks that only log what they would do
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHooks;

impl RemediationHooks for LoggingHooks {
    fn throttle(&self, metric: Metric, rate: f64) -> Result<(), String> {
        tracing::warn!(%metric, rate, "throttling requests");
        Ok(())
    }

    fn notify(&self, severity: ViolationSeverity, message: &str) -> Result<(), String> {
        tracing::warn!(%severity, "notification: {}", message);
        Ok(())
    }
}

/// Everything an action handler may touch
pub struct ResponseContext<'a> {
    pub store: &'a mut ThresholdStore,
    pub window: &'a [MetricSample],
    pub statistics: &'a mut ViolationStatistics,
    pub audit: &'a dyn AuditSink,
    pub hooks: &'a dyn RemediationHooks,
    pub now: u64,
}

/// Maps violations to prioritized remediation actions
#[derive(Debug, Clone)]
pub struct AutoResponseOrchestrator {
    config: ResponseConfig,
}

impl AutoResponseOrchestrator {
    pub fn new(config: ResponseConfig) -> Self {
        Self { config }
    }

    /// Severity from the breach ratio; a caller-supplied severity wins
    pub fn assess_severity(&self, violation: &Violation) -> ViolationSeverity {
        if let Some(severity) = violation.severity {
            return severity;
        }
        match violation
            .metric
            .breach_ratio(violation.value, violation.threshold)
        {
            None => ViolationSeverity::Critical,
            Some(r) if r > 3.0 => ViolationSeverity::Critical,
            Some(r) if r > 2.0 => ViolationSeverity::High,
            Some(r) if r > 1.5 => ViolationSeverity::Medium,
            Some(_) => ViolationSeverity::Low,
        }
    }

    /// Action list for `severity`, sorted by priority
    pub fn plan(&self, severity: ViolationSeverity) -> Vec<ResponseAction> {
        let mut actions = vec![ResponseAction::new(ActionType::LogViolation, 1)];
        match severity {
            ViolationSeverity::Critical => {
                actions.push(ResponseAction::new(ActionType::ImmediateAlert, 1));
                actions.push(
                    ResponseAction::new(ActionType::ThrottleRequests, 2)
                        .with_throttle_rate(self.config.throttle_rate),
                );
            }
            ViolationSeverity::High => {
                actions.push(ResponseAction::new(ActionType::SendNotification, 2));
                actions.push(
                    ResponseAction::new(ActionType::AdjustThreshold, 3)
                        .with_factor(self.config.adjust_factor),
                );
            }
            ViolationSeverity::Medium => {
                actions.push(ResponseAction::new(ActionType::CollectDiagnostics, 3));
            }
            ViolationSeverity::Low => {
                actions.push(ResponseAction::new(ActionType::UpdateStatistics, 4));
            }
        }
        // Stable: log_violation stays ahead of immediate_alert
        actions.sort_by_key(|a| a.priority);
        actions
    }

    /// min(1, success_ratio * 0.7 + sum of weights of successful actions)
    pub fn effectiveness(results: &[ActionResult]) -> f64 {
        if results.is_empty() {
            return 0.0;
        }
        let successes: Vec<&ActionResult> = results.iter().filter(|r| r.success).collect();
        let base = successes.len() as f64 / results.len() as f64;
        let weighted: f64 = successes.iter().map(|r| r.action.action_type.weight()).sum();
        (base * 0.7 + weighted).min(1.0)
    }

    /// Assess, plan and execute the response to one violation
    pub fn respond(&self, violation: &Violation, ctx: &mut ResponseContext<'_>) -> ResponseResult {
        let severity = self.assess_severity(violation);
        let actions = self.plan(severity);
        self.execute_plan(violation, severity, actions, ctx)
    }

    /// Execute an explicit action plan
    pub fn execute_plan(
        &self,
        violation: &Violation,
        severity: ViolationSeverity,
        mut actions: Vec<ResponseAction>,
        ctx: &mut ResponseContext<'_>,
    ) -> ResponseResult {
        let start = Instant::now();
        actions.sort_by_key(|a| a.priority);

        let results: Vec<ActionResult> = actions
            .into_iter()
            .map(|action| self.execute(action, violation, severity, ctx))
            .collect();

        let effectiveness = Self::effectiveness(&results);
        let follow_up_required = effectiveness < self.config.follow_up_below;
        tracing::info!(
            metric = %violation.metric,
            %severity,
            effectiveness,
            follow_up_required,
            "violation handled"
        );

        ResponseResult {
            severity,
            actions: results,
            effectiveness,
            follow_up_required,
            execution_time_ms: start.elapsed().as_secs_f64() * 1000.0,
        }
    }

    fn execute(
        &self,
        action: ResponseAction,
        violation: &Violation,
        severity: ViolationSeverity,
        ctx: &mut ResponseContext<'_>,
    ) -> ActionResult {
        let start = Instant::now();
        let outcome = match action.action_type {
            ActionType::LogViolation => self.log_violation(violation, severity, ctx),
            ActionType::ImmediateAlert => self.immediate_alert(violation, ctx),
            ActionType::ThrottleRequests => self.throttle_requests(action, violation, ctx),
            ActionType::SendNotification => self.send_notification(violation, severity, ctx),
            ActionType::AdjustThreshold => self.adjust_threshold(action, violation, ctx),
            ActionType::CollectDiagnostics => Ok(collect_diagnostics(violation.metric, ctx)),
            ActionType::UpdateStatistics => {
                ctx.statistics.record(violation.metric, severity);
                Ok(json!({ "total": ctx.statistics.total }))
            }
            ActionType::Unknown => Err(ActionError::UnknownAction),
        };
        let execution_time_ms = start.elapsed().as_secs_f64() * 1000.0;

        match outcome {
            Ok(details) => ActionResult {
                action,
                success: true,
                execution_time_ms,
                details,
                error: None,
            },
            Err(e) => {
                tracing::warn!(action = %action.action_type, error = %e, "response action failed");
                ActionResult {
                    action,
                    success: false,
                    execution_time_ms,
                    details: serde_json::Value::Null,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    fn log_violation(
        &self,
        violation: &Violation,
        severity: ViolationSeverity,
        ctx: &ResponseContext<'_>,
    ) -> Result<serde_json::Value, ActionError> {
        let alert = AlertRecord::new(
            "threshold_violation",
            alert_severity(severity),
            format!(
                "{} value {:.2} breached threshold {:.2}",
                violation.metric, violation.value, violation.threshold
            ),
            ctx.now,
            violation_metrics(violation),
        );
        let id = alert.id.clone();
        ctx.audit.record(alert)?;
        Ok(json!({ "alertId": id }))
    }

    fn immediate_alert(
        &self,
        violation: &Violation,
        ctx: &ResponseContext<'_>,
    ) -> Result<serde_json::Value, ActionError> {
        let mut alert = AlertRecord::new(
            "immediate_alert",
            AlertSeverity::Critical,
            format!(
                "CRITICAL: {} at {:.2} is far past threshold {:.2}",
                violation.metric, violation.value, violation.threshold
            ),
            ctx.now,
            violation_metrics(violation),
        );
        if let Some(op) = &violation.operation_id {
            alert = alert.with_details(json!({ "operationId": op }));
        }
        let id = alert.id.clone();
        ctx.audit.record(alert)?;
        Ok(json!({ "alertId": id }))
    }

    fn throttle_requests(
        &self,
        action: ResponseAction,
        violation: &Violation,
        ctx: &ResponseContext<'_>,
    ) -> Result<serde_json::Value, ActionError> {
        let rate = action
            .parameters
            .throttle_rate
            .unwrap_or(self.config.throttle_rate);
        if !(0.0..=1.0).contains(&rate) {
            return Err(ActionError::InvalidParameter(format!(
                "throttle rate {} outside [0, 1]",
                rate
            )));
        }
        ctx.hooks
            .throttle(violation.metric, rate)
            .map_err(ActionError::Hook)?;
        Ok(json!({ "throttleRate": rate }))
    }

    fn send_notification(
        &self,
        violation: &Violation,
        severity: ViolationSeverity,
        ctx: &ResponseContext<'_>,
    ) -> Result<serde_json::Value, ActionError> {
        let message = format!(
            "{} violation on {}: {:.2} (threshold {:.2})",
            severity, violation.metric, violation.value, violation.threshold
        );
        ctx.hooks
            .notify(severity, &message)
            .map_err(ActionError::Hook)?;
        Ok(json!({ "message": message }))
    }

    /// Temporary relaxation of the violated threshold
    fn adjust_threshold(
        &self,
        action: ResponseAction,
        violation: &Violation,
        ctx: &mut ResponseContext<'_>,
    ) -> Result<serde_json::Value, ActionError> {
        let factor = action.parameters.factor.unwrap_or(self.config.adjust_factor);
        if !(factor.is_finite() && factor > 0.0) {
            return Err(ActionError::InvalidParameter(format!(
                "adjustment factor {} must be positive",
                factor
            )));
        }
        if !(violation.threshold.is_finite() && violation.threshold > 0.0) {
            return Err(ActionError::InvalidParameter(format!(
                "cannot relax threshold {}",
                violation.threshold
            )));
        }

        let mut value = violation.metric.relax(violation.threshold, factor);
        // Stacked overrides never drift past the ceiling around the managed value
        let managed = ctx.store.managed(violation.metric);
        if managed.is_finite() && managed > 0.0 {
            let ceiling = violation
                .metric
                .relax(managed, self.config.max_override_ratio);
            if violation.metric.breaches(value, ceiling) {
                value = ceiling;
            }
        }
        let ttl_ms = self.config.override_ttl_secs.saturating_mul(1000);
        let ov = ctx
            .store
            .apply_override(violation.metric, value, ctx.now, ttl_ms);
        Ok(json!({
            "newThreshold": ov.value,
            "displaced": ov.displaced,
            "expiresAt": ov.expires_at,
        }))
    }
}

fn collect_diagnostics(metric: Metric, ctx: &ResponseContext<'_>) -> serde_json::Value {
    let series = MetricSample::series(ctx.window, metric);
    let statistics = summarize(&series).ok();
    json!({
        "metric": metric,
        "samples": series.len(),
        "statistics": statistics,
        "currentThreshold": ctx.store.current(metric),
    })
}

fn violation_metrics(violation: &Violation) -> serde_json::Value {
    json!({
        "metric": violation.metric,
        "value": violation.value,
        "threshold": violation.threshold,
    })
}

pub(crate) fn alert_severity(severity: ViolationSeverity) -> AlertSeverity {
    match severity {
        ViolationSeverity::Low => AlertSeverity::Low,
        ViolationSeverity::Medium => AlertSeverity::Medium,
        ViolationSeverity::High => AlertSeverity::High,
        ViolationSeverity::Critical => AlertSeverity::Critical,
    }
}
