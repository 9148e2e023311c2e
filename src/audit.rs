//! Structured alert records and the audit sink they are delivered to
//!
//! Alerting is a side channel: a sink that fails never changes what the
//! engine returns. Failures surface through the engine's own counters and
//! log output.

use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::hash::Hasher;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;

/// Errors from an audit sink
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Audit sink unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to serialize alert: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Severity carried on an alert record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Low => "low",
            AlertSeverity::Medium => "medium",
            AlertSeverity::High => "high",
            AlertSeverity::Critical => "critical",
        }
    }
}

/// Alert record accepted by the audit collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub alert_type: String,
    pub severity: AlertSeverity,
    pub message: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
    pub metrics: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AlertRecord {
    pub fn new(
        alert_type: impl Into<String>,
        severity: AlertSeverity,
        message: impl Into<String>,
        timestamp: u64,
        metrics: serde_json::Value,
    ) -> Self {
        let alert_type = alert_type.into();
        let message = message.into();
        Self {
            id: generate_alert_id(&alert_type, timestamp, &message),
            alert_type,
            severity,
            message,
            timestamp,
            metrics,
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Stable alert ID: FNV-1a over type, timestamp and message, as 16 hex digits
pub fn generate_alert_id(alert_type: &str, timestamp: u64, message: &str) -> String {
    let mut hasher = fnv::FnvHasher::default();
    hasher.write(alert_type.as_bytes());
    hasher.write(b"|");
    hasher.write(&timestamp.to_le_bytes());
    hasher.write(b"|");
    hasher.write(message.as_bytes());
    format!("{:016x}", hasher.finish())
}

/// Destination for alert records
pub trait AuditSink: Send + Sync {
    fn record(&self, alert: AlertRecord) -> Result<(), AuditError>;
}

/// Emits alerts as structured `tracing` events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, alert: AlertRecord) -> Result<(), AuditError> {
        match alert.severity {
            AlertSeverity::Critical | AlertSeverity::High => tracing::error!(
                id = %alert.id,
                alert_type = %alert.alert_type,
                severity = alert.severity.as_str(),
                metrics = %alert.metrics,
                "{}",
                alert.message
            ),
            AlertSeverity::Medium => tracing::warn!(
                id = %alert.id,
                alert_type = %alert.alert_type,
                severity = alert.severity.as_str(),
                metrics = %alert.metrics,
                "{}",
                alert.message
            ),
            AlertSeverity::Low | AlertSeverity::Info => tracing::info!(
                id = %alert.id,
                alert_type = %alert.alert_type,
                severity = alert.severity.as_str(),
                metrics = %alert.metrics,
                "{}",
                alert.message
            ),
        }
        Ok(())
    }
}

/// Collects alerts in memory
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AlertRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AlertRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, alert: AlertRecord) -> Result<(), AuditError> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(alert);
        Ok(())
    }
}

/// Appends one JSON record per line to a file
#[derive(Debug)]
pub struct JsonLinesAuditSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonLinesAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }
}

impl AuditSink for JsonLinesAuditSink {
    fn record(&self, alert: AlertRecord) -> Result<(), AuditError> {
        let mut line = serde_json::to_vec(&alert)?;
        line.push(b'\n');
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&line)?;
        Ok(())
    }
}
