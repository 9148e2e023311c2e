//! Perfguard - adaptive performance thresholds and degradation response
//!
//! This library keeps statistically derived thresholds for a fixed set of
//! performance metrics, detects degradation against long-run baselines and
//! linear trends, flags z-score anomalies, and drives prioritized remediation
//! when a sample breaches an enforced threshold.

pub mod adjuster;
pub mod anomaly;
pub mod audit;
pub mod baseline;
pub mod cli;
pub mod clock;
pub mod config;
pub mod degradation;
pub mod engine;
pub mod ledger;
pub mod metrics;
pub mod persistence;
pub mod response;
pub mod statistics;
pub mod thresholds;
pub mod trend;

pub use engine::{EngineError, EngineStats, PerformanceEngine, SharedEngine};
pub use metrics::{Metric, MetricSample};
pub use thresholds::{Violation, ViolationSeverity};
