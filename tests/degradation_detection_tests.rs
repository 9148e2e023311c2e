//! Degradation, trend and anomaly detection through the engine facade

use perfguard::audit::{AlertSeverity, MemoryAuditSink};
use perfguard::baseline::{default_baselines, Baseline, Percentiles};
use perfguard::config::EngineConfig;
use perfguard::degradation::{DegradationSeverity, IndicatorSeverity, IndicatorType};
use perfguard::engine::PerformanceEngine;
use perfguard::metrics::{Metric, MetricSample};
use perfguard::trend::TrendDirection;
use std::sync::Arc;

fn nominal(ts: u64) -> MetricSample {
    MetricSample {
        execution_time_ms: 1000.0,
        memory_bytes: 256.0 * 1024.0 * 1024.0,
        cpu_percent: 35.0,
        error_rate_percent: 0.5,
        throughput_ops_per_sec: 100.0,
        timestamp: ts,
    }
}

fn open() -> (PerformanceEngine, Arc<MemoryAuditSink>) {
    let audit = Arc::new(MemoryAuditSink::new());
    let engine = PerformanceEngine::open(EngineConfig::default(), audit.clone()).unwrap();
    (engine, audit)
}

#[test]
fn test_nominal_sample_is_clean() {
    let (mut engine, audit) = open();
    let result = engine.detect_degradation(nominal(1));
    assert!(!result.detected);
    assert_eq!(result.severity, DegradationSeverity::None);
    assert!(audit.is_empty());
}

#[test]
fn test_single_warning_is_low_severity() {
    let (mut engine, audit) = open();
    let mut sample = nominal(1);
    sample.execution_time_ms = 1450.0;
    let result = engine.detect_degradation(sample);

    assert!(result.detected);
    assert_eq!(result.severity, DegradationSeverity::Low);
    assert_eq!(result.indicators[0].severity, IndicatorSeverity::Warning);
    assert!((result.indicators[0].deviation - 0.45).abs() < 1e-9);
    assert_eq!(audit.records()[0].severity, AlertSeverity::Low);
}

#[test]
fn test_two_and_three_warnings() {
    let (mut engine, _) = open();

    let mut two = nominal(1);
    two.execution_time_ms = 1450.0; // z 1.8
    two.cpu_percent = 52.0; // +48.6%, z 1.7
    assert_eq!(
        engine.detect_degradation(two).severity,
        DegradationSeverity::Medium
    );

    let mut three = two;
    three.throughput_ops_per_sec = 65.0; // -35%, z 1.75
    let result = engine.detect_degradation(three);
    assert_eq!(result.severity, DegradationSeverity::High);
    assert!(result
        .recommendations
        .iter()
        .any(|r| r.contains("system-wide")));
}

#[test]
fn test_confidence_capped() {
    let (mut engine, _) = open();
    let mut sample = nominal(1);
    sample.execution_time_ms = 10_000.0;
    let result = engine.detect_degradation(sample);
    assert_eq!(result.severity, DegradationSeverity::Critical);
    assert_eq!(result.confidence, 0.9);
}

#[test]
fn test_window_trend_feeds_detection() {
    let (mut engine, audit) = open();
    // Rising execution time that stays within 20% of baseline: only the
    // trend can flag it
    for i in 0..19 {
        let mut s = nominal(i);
        s.execution_time_ms = 1000.0 + 10.0 * i as f64;
        engine.record_sample(s);
    }
    let mut last = nominal(19);
    last.execution_time_ms = 1190.0;
    let result = engine.detect_degradation(last);

    assert!(result.detected);
    let trend = result
        .indicators
        .iter()
        .find(|i| i.indicator_type == IndicatorType::TrendDegradation)
        .unwrap();
    assert_eq!(trend.metric, Metric::ExecutionTime);
    assert_eq!(trend.severity, IndicatorSeverity::Critical);
    assert!((trend.deviation - 0.19).abs() < 1e-9);
    assert!(result
        .indicators
        .iter()
        .all(|i| i.indicator_type != IndicatorType::BaselineDeviation));
    assert_eq!(audit.len(), 1);
}

#[test]
fn test_zero_mean_baseline_skipped() {
    let (mut engine, _) = open();
    let mut baselines = default_baselines();
    baselines.insert(
        Metric::ErrorRate,
        Baseline {
            mean: 0.0,
            stddev: 0.0,
            percentiles: Percentiles {
                p50: 0.0,
                p90: 0.0,
                p95: 0.0,
                p99: 0.0,
            },
            established_at: 0,
            sample_size: 100,
        },
    );
    engine.replace_baselines(baselines).unwrap();

    let mut sample = nominal(1);
    sample.error_rate_percent = 4.0;
    assert!(!engine.detect_degradation(sample).detected);
}

#[test]
fn test_invalid_baseline_replacement_rejected() {
    let (mut engine, _) = open();
    let before = engine.baselines().clone();
    let mut baselines = default_baselines();
    if let Some(b) = baselines.get_mut(&Metric::CpuUsage) {
        b.percentiles.p50 = 99.0;
    }
    assert!(engine.replace_baselines(baselines).is_err());
    assert_eq!(engine.baselines(), &before);
}

#[test]
fn test_analyze_trends_short_history() {
    let (engine, _) = open();
    let history: Vec<MetricSample> = (0..9).map(nominal).collect();
    assert!(engine.analyze_trends(&history).is_empty());
}

#[test]
fn test_analyze_trends_arithmetic_series() {
    let (engine, _) = open();
    let history: Vec<MetricSample> = (0..25)
        .map(|i| {
            let mut s = nominal(i);
            s.cpu_percent = 20.0 + 2.0 * i as f64;
            s.throughput_ops_per_sec = 200.0 - 3.0 * i as f64;
            s
        })
        .collect();
    let trends = engine.analyze_trends(&history);

    let cpu = trends.iter().find(|t| t.metric == Metric::CpuUsage).unwrap();
    assert_eq!(cpu.direction, TrendDirection::Degrading);
    assert!((cpu.correlation - 1.0).abs() < 1e-9);

    let tp = trends
        .iter()
        .find(|t| t.metric == Metric::Throughput)
        .unwrap();
    assert_eq!(tp.direction, TrendDirection::Degrading);

    let mem = trends
        .iter()
        .find(|t| t.metric == Metric::MemoryUsage)
        .unwrap();
    assert_eq!(mem.direction, TrendDirection::Stable);
    assert_eq!(mem.confidence, 0.0);
}

#[test]
fn test_anomalies_constant_window() {
    let (mut engine, _) = open();
    let window: Vec<MetricSample> = (0..40).map(nominal).collect();
    assert!(engine.detect_anomalies(&window).is_empty());
}

#[test]
fn test_anomalies_spike() {
    let (mut engine, _) = open();
    let mut window: Vec<MetricSample> = (0..40).map(nominal).collect();
    window[17].memory_bytes = 4.0 * 1024.0 * 1024.0 * 1024.0;
    let anomalies = engine.detect_anomalies(&window);
    assert_eq!(anomalies.len(), 1);
    assert_eq!(anomalies[0].metric, Metric::MemoryUsage);
    assert_eq!(anomalies[0].timestamp, 17);
    assert_eq!(engine.stats().anomalies_detected, 1);
}
