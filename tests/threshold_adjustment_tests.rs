//! Dynamic threshold adjustment through the engine facade
//!
//! Guard rails, insufficient-data handling, override reconciliation and
//! history persistence across restarts.

use perfguard::audit::MemoryAuditSink;
use perfguard::clock::ManualClock;
use perfguard::config::{EngineConfig, WriteMode};
use perfguard::engine::PerformanceEngine;
use perfguard::metrics::{Metric, MetricSample};
use perfguard::thresholds::Violation;
use std::sync::Arc;
use tempfile::TempDir;

fn samples(exec: impl Fn(usize) -> f64, n: usize) -> Vec<MetricSample> {
    (0..n)
        .map(|i| MetricSample {
            execution_time_ms: exec(i),
            memory_bytes: 400.0 * 1024.0 * 1024.0,
            cpu_percent: 50.0,
            error_rate_percent: 0.2,
            throughput_ops_per_sec: 120.0,
            timestamp: i as u64,
        })
        .collect()
}

fn config_with_exec(limit: f64) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.thresholds.insert("executionTime".to_string(), limit);
    config
}

fn open(config: EngineConfig) -> (PerformanceEngine, Arc<MemoryAuditSink>, Arc<ManualClock>) {
    let audit = Arc::new(MemoryAuditSink::new());
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let engine = PerformanceEngine::open(config, audit.clone())
        .unwrap()
        .with_clock(clock.clone());
    (engine, audit, clock)
}

#[test]
fn test_fewer_than_ten_samples_is_noop() {
    let (mut engine, audit, _) = open(config_with_exec(1000.0));
    let before = engine.state().clone();

    for n in 0..10 {
        let result = engine.adjust_thresholds_dynamically(&samples(|_| 950.0, n));
        assert!(!result.success, "n={} should be insufficient", n);
        assert!(result.reason.as_deref().unwrap().contains("insufficient data"));
        assert!(result.adjustments.is_empty());
    }

    assert_eq!(engine.state(), &before);
    assert!(audit.is_empty());
    assert_eq!(engine.stats().adjustment_rounds, 0);
}

#[test]
fn test_too_strict_threshold_moves_up() {
    let (mut engine, audit, _) = open(config_with_exec(1000.0));
    // p90 = 900 > 800; p95 = 900 -> suggested 1080 (+8%)
    let result = engine.adjust_thresholds_dynamically(&samples(|_| 900.0, 20));

    assert!(result.success);
    let exec = result
        .applied()
        .find(|a| a.metric == Metric::ExecutionTime)
        .unwrap();
    assert!((exec.new_value - 1080.0).abs() < 1e-6);
    assert!((engine.thresholds().current.get(Metric::ExecutionTime) - 1080.0).abs() < 1e-6);
    assert_eq!(engine.adjustment_history().len(), 1);

    let records = audit.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].alert_type, "threshold_adjustment");
}

#[test]
fn test_accepted_adjustments_respect_change_ceiling() {
    let (mut engine, _, _) = open(config_with_exec(1000.0));
    for level in [100.0, 700.0, 950.0, 1500.0, 3000.0] {
        let result = engine.adjust_thresholds_dynamically(&samples(|i| level + i as f64, 30));
        for adj in result.applied() {
            assert!(
                ((adj.new_value - adj.old_value) / adj.old_value).abs() <= 0.30 + 1e-12,
                "{:?}",
                adj
            );
        }
    }
}

#[test]
fn test_rejected_adjustment_is_transparent() {
    let (mut engine, _, _) = open(config_with_exec(1000.0));
    let result = engine.adjust_thresholds_dynamically(&samples(|_| 100.0, 20));
    let exec = result
        .adjustments
        .iter()
        .find(|a| a.metric == Metric::ExecutionTime)
        .unwrap();

    assert!(!exec.applied);
    assert!(exec.rejection.is_some());
    assert_eq!(engine.thresholds().current.get(Metric::ExecutionTime), 1000.0);
    assert!((engine.thresholds().adaptive.get(Metric::ExecutionTime) - 120.0).abs() < 1e-6);
    assert_eq!(engine.stats().adjustments_rejected, 1);
}

#[test]
fn test_error_rate_and_throughput_never_adjusted() {
    let (mut engine, _, _) = open(EngineConfig::default());
    let result = engine.adjust_thresholds_dynamically(&samples(|_| 4900.0, 40));
    assert!(result
        .adjustments
        .iter()
        .all(|a| Metric::ADJUSTABLE.contains(&a.metric)));
    assert!(!result.statistics.contains_key(&Metric::ErrorRate));
    assert!(!result.statistics.contains_key(&Metric::Throughput));
}

#[test]
fn test_committed_adjustment_supersedes_override() {
    let (mut engine, _, clock) = open(config_with_exec(1000.0));

    // 2.4x breach -> high -> temporary override to 1200
    engine.handle_threshold_violation(Violation::new(Metric::ExecutionTime, 2400.0, 1000.0));
    assert_eq!(engine.thresholds().current.get(Metric::ExecutionTime), 1200.0);
    assert_eq!(engine.thresholds().overrides.len(), 1);

    clock.advance(60_000);
    // p90 1100 > 960 -> suggested 1320 (+10% from the override)
    engine.adjust_thresholds_dynamically(&samples(|_| 1100.0, 20));
    assert!(engine.thresholds().overrides.is_empty());
    let committed = engine.thresholds().current.get(Metric::ExecutionTime);
    assert!((committed - 1320.0).abs() < 1e-6);

    clock.advance(3_600_000);
    engine.expire_overrides();
    assert!((engine.thresholds().current.get(Metric::ExecutionTime) - committed).abs() < 1e-9);
}

#[test]
fn test_expired_override_restored_before_adjusting() {
    let (mut engine, _, clock) = open(config_with_exec(1000.0));
    engine.handle_threshold_violation(Violation::new(Metric::ExecutionTime, 2400.0, 1000.0));

    clock.advance(16 * 60 * 1000);
    let result = engine.adjust_thresholds_dynamically(&samples(|_| 500.0, 20));
    assert_eq!(
        result.previous_thresholds.get(Metric::ExecutionTime),
        1000.0
    );
    assert_eq!(engine.stats().overrides_expired, 1);
}

#[test]
fn test_history_persists_across_restart() {
    let dir = TempDir::new().unwrap();
    let mut config = config_with_exec(1000.0);
    config.storage.directory = Some(dir.path().to_path_buf());
    config.storage.write_mode = WriteMode::Deferred;

    let expected = {
        let (mut engine, _, _) = open(config.clone());
        engine.adjust_thresholds_dynamically(&samples(|_| 900.0, 20));
        engine.adjust_thresholds_dynamically(&samples(|_| 1000.0, 20));
        engine.flush();
        engine.adjustment_history()
    };
    assert!(!expected.is_empty());
    assert!(dir.path().join("threshold_history.json").exists());

    let (engine, _, _) = open(config);
    assert_eq!(engine.adjustment_history(), expected);
    let last = expected.last().unwrap();
    assert_eq!(engine.thresholds().current.get(last.metric), last.new_value);
}

#[test]
fn test_unreadable_history_falls_back_to_defaults() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("threshold_history.json"), "not json").unwrap();
    let mut config = EngineConfig::default();
    config.storage.directory = Some(dir.path().to_path_buf());

    let (engine, _, _) = open(config);
    assert!(engine.adjustment_history().is_empty());
    assert_eq!(engine.thresholds().current.get(Metric::ExecutionTime), 5000.0);
}

#[test]
fn test_persistence_failure_does_not_fail_adjustment() {
    let dir = TempDir::new().unwrap();
    // A file where the state directory should be makes every write fail
    let blocker = dir.path().join("state");
    std::fs::write(&blocker, "x").unwrap();

    let mut config = config_with_exec(1000.0);
    config.storage.directory = Some(blocker);
    config.storage.write_mode = WriteMode::Immediate;

    let (mut engine, _, _) = open(config);
    let result = engine.adjust_thresholds_dynamically(&samples(|_| 900.0, 20));
    assert!(result.success);
    assert_eq!(result.applied_count(), 1);
    assert!(engine.persistence_stats().writes_failed >= 1);
}

#[test]
fn test_fully_rejected_round_reports_zero_confidence() {
    let (mut engine, _, _) = open(config_with_exec(1000.0));
    // p90 = 900 > 800 -> 1080 committed with confidence 0.8
    let first = engine.adjust_thresholds_dynamically(&samples(|_| 900.0, 20));
    assert_eq!(first.applied_count(), 1);
    assert_eq!(engine.state().confidence, 0.8);

    // p99 = 20 far below 1080 -> suggested 24 is a >30% drop and rejected
    let result = engine.adjust_thresholds_dynamically(&samples(|_| 20.0, 20));
    assert!(result.success);
    assert_eq!(result.applied_count(), 0);
    assert_eq!(result.adjustments.len(), 1);
    assert_eq!(result.confidence, 0.0);
    assert_eq!(
        result.reason.as_deref(),
        Some("all suggested adjustments rejected")
    );
    assert!(result.to_report_string().contains("all suggested adjustments rejected"));

    // Thresholds in force did not move, so neither does their confidence
    assert_eq!(engine.state().confidence, 0.8);
    assert!((engine.thresholds().current.get(Metric::ExecutionTime) - 1080.0).abs() < 1e-6);
}
