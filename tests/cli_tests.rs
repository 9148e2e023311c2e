//! CLI integration tests for the perfguard binary
#![allow(deprecated)] // suppress assert_cmd::Command::cargo_bin deprecation in tests

use predicates::prelude::*;
use std::path::PathBuf;
use tempfile::TempDir;

fn write_samples(dir: &TempDir, name: &str, exec: impl Fn(usize) -> f64, n: usize) -> PathBuf {
    let samples: Vec<serde_json::Value> = (0..n)
        .map(|i| {
            serde_json::json!({
                "executionTimeMs": exec(i),
                "memoryBytes": 268435456.0,
                "cpuPercent": 35.0,
                "errorRatePercent": 0.5,
                "throughputOpsPerSec": 100.0,
                "timestamp": i,
            })
        })
        .collect();
    let path = dir.path().join(name);
    std::fs::write(&path, serde_json::to_vec(&samples).unwrap()).unwrap();
    path
}

#[test]
fn test_adjust_insufficient_data() {
    let dir = TempDir::new().unwrap();
    let samples = write_samples(&dir, "s.json", |_| 100.0, 5);
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("perfguard");
    cmd.arg("adjust")
        .arg(&samples)
        .assert()
        .success()
        .stdout(predicate::str::contains("NO ADJUSTMENT"))
        .stdout(predicate::str::contains("insufficient data"));
}

#[test]
fn test_adjust_json_persists_history() {
    let dir = TempDir::new().unwrap();
    let state = dir.path().join("state");
    let samples = write_samples(&dir, "s.json", |_| 4800.0, 20);

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("perfguard");
    cmd.arg("adjust")
        .arg(&samples)
        .arg("--format")
        .arg("json")
        .arg("--state-dir")
        .arg(&state)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"success\": true"))
        .stdout(predicate::str::contains("\"applied\": true"));

    assert!(state.join("threshold_history.json").exists());
}

#[test]
fn test_detect_reports_degradation() {
    let dir = TempDir::new().unwrap();
    let samples = write_samples(&dir, "s.json", |i| if i == 4 { 3000.0 } else { 1000.0 }, 5);
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("perfguard");
    cmd.arg("detect")
        .arg(&samples)
        .assert()
        .success()
        .stdout(predicate::str::contains("DEGRADATION DETECTED"))
        .stdout(predicate::str::contains("executionTime"));
}

#[test]
fn test_detect_empty_file_fails() {
    let dir = TempDir::new().unwrap();
    let samples = write_samples(&dir, "s.json", |_| 1000.0, 0);
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("perfguard");
    cmd.arg("detect")
        .arg(&samples)
        .assert()
        .failure()
        .stderr(predicate::str::contains("empty"));
}

#[test]
fn test_trends_text() {
    let dir = TempDir::new().unwrap();
    let samples = write_samples(&dir, "s.json", |i| 1000.0 + 25.0 * i as f64, 15);
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("perfguard");
    cmd.arg("trends")
        .arg(&samples)
        .assert()
        .success()
        .stdout(predicate::str::contains("executionTime is degrading"));
}

#[test]
fn test_anomalies_json() {
    let dir = TempDir::new().unwrap();
    let samples = write_samples(&dir, "s.json", |i| if i == 30 { 90_000.0 } else { 1000.0 }, 40);
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("perfguard");
    cmd.arg("anomalies")
        .arg(&samples)
        .arg("--format")
        .arg("json")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"severity\": \"critical\""));
}

#[test]
fn test_violation_critical() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("perfguard");
    cmd.arg("violation")
        .arg("--metric")
        .arg("executionTime")
        .arg("--value")
        .arg("17500")
        .arg("--threshold")
        .arg("5000")
        .assert()
        .success()
        .stdout(predicate::str::contains("severity: critical"))
        .stdout(predicate::str::contains("immediate_alert"));
}

#[test]
fn test_violation_writes_audit_trail() {
    let dir = TempDir::new().unwrap();
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("perfguard");
    cmd.arg("--state-dir")
        .arg(dir.path())
        .arg("violation")
        .arg("--metric")
        .arg("cpuUsage")
        .arg("--value")
        .arg("90")
        .arg("--threshold")
        .arg("80")
        .assert()
        .success();

    let audit = std::fs::read_to_string(dir.path().join("audit.jsonl")).unwrap();
    assert!(audit.contains("threshold_violation"));
    assert!(dir.path().join("response_history.json").exists());
}

#[test]
fn test_check_finds_violations() {
    let dir = TempDir::new().unwrap();
    let samples = write_samples(&dir, "s.json", |i| if i % 2 == 0 { 7000.0 } else { 100.0 }, 6);
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("perfguard");
    cmd.arg("check")
        .arg(&samples)
        .arg("--respond")
        .assert()
        .success()
        .stdout(predicate::str::contains("3 VIOLATIONS"))
        .stdout(predicate::str::contains("VIOLATION RESPONSE"));
}

#[test]
fn test_invalid_config_rejected() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("perfguard.toml");
    std::fs::write(&config, "[adjustment]\nmax_change_ratio = 3.0\n").unwrap();
    let samples = write_samples(&dir, "s.json", |_| 100.0, 3);

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("perfguard");
    cmd.arg("--config")
        .arg(&config)
        .arg("adjust")
        .arg(&samples)
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_change_ratio"));
}

#[test]
fn test_missing_samples_file() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("perfguard");
    cmd.arg("trends")
        .arg("/nonexistent/samples.json")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read samples"));
}
