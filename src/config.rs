// Engine configuration
//
// Every constant the decision logic uses lives here so deployments can tune
// guard rails from a TOML file without touching code. The defaults are the
// production values; presets only move guard rails.

use crate::metrics::Metric;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Statistical threshold adjustment guard rails
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdjustmentConfig {
    /// Minimum number of samples before any adjustment is considered
    pub min_samples: usize,
    /// Threshold is "too strict" when p90 exceeds `current * strict_ratio`
    pub strict_ratio: f64,
    /// Threshold is "too loose" when p99 is below `current * loose_ratio`
    pub loose_ratio: f64,
    /// Largest accepted relative move of a threshold in one adjustment
    pub max_change_ratio: f64,
    /// Minimum confidence for an adjustment to be committed
    pub min_confidence: f64,
    /// Confidence assigned to every adjustment that was needed
    pub need_confidence: f64,
    /// Confidence reported when no threshold needed to move
    pub stable_confidence: f64,
    /// Safety margin applied to p95 for execution time
    pub execution_time_margin: f64,
    /// Safety margin applied to p95 for memory usage
    pub memory_margin: f64,
    /// Safety margin applied to p95 for CPU usage (capped at 100%)
    pub cpu_margin: f64,
}

impl Default for AdjustmentConfig {
    fn default() -> Self {
        Self {
            min_samples: 10,
            strict_ratio: 0.8,
            loose_ratio: 0.6,
            max_change_ratio: 0.30,
            min_confidence: 0.70,
            need_confidence: 0.8,
            stable_confidence: 0.9,
            execution_time_margin: 1.2,
            memory_margin: 1.1,
            cpu_margin: 1.1,
        }
    }
}

impl AdjustmentConfig {
    /// Margin applied to p95 when suggesting a new threshold
    pub fn margin(&self, metric: Metric) -> f64 {
        match metric {
            Metric::ExecutionTime => self.execution_time_margin,
            Metric::MemoryUsage => self.memory_margin,
            Metric::CpuUsage => self.cpu_margin,
            Metric::ErrorRate | Metric::Throughput => 1.0,
        }
    }
}

/// Linear trend analysis settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    /// Minimum series length for a trend to be reported
    pub min_points: usize,
    /// Slopes within +/- deadband are classified as stable
    pub deadband: f64,
    /// Forecast horizons, in samples past the last observation
    pub horizons: Vec<u32>,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            min_points: 10,
            deadband: 0.01,
            horizons: vec![1, 5, 10],
        }
    }
}

/// Z-score outlier scan settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Values with z above this are anomalies
    pub warning_z: f64,
    /// Anomalies with z above this are critical
    pub critical_z: f64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            warning_z: 3.0,
            critical_z: 4.0,
        }
    }
}

/// Baseline deviation and trend fusion settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DegradationConfig {
    /// Relative worsening against the baseline mean that raises an indicator
    pub deviation_threshold: f64,
    /// z above this is high significance
    pub high_significance_z: f64,
    /// z above this is medium significance
    pub medium_significance_z: f64,
    /// Minimum trend confidence (|r|) for a trend indicator
    pub trend_confidence: f64,
    /// Trend slopes above this are critical
    pub critical_slope: f64,
    /// Recent samples kept for trend fusion
    pub window_capacity: usize,
}

impl Default for DegradationConfig {
    fn default() -> Self {
        Self {
            deviation_threshold: 0.20,
            high_significance_z: 2.5,
            medium_significance_z: 1.5,
            trend_confidence: 0.7,
            critical_slope: 0.1,
            window_capacity: 100,
        }
    }
}

/// Automated response settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseConfig {
    /// Rate passed to the throttle hook on critical violations
    pub throttle_rate: f64,
    /// Factor applied by the temporary threshold override on high violations
    pub adjust_factor: f64,
    /// Ceiling for a temporary override relative to the statistically
    /// managed value, however many high violations stack
    pub max_override_ratio: f64,
    /// How long a temporary threshold override stays in force
    pub override_ttl_secs: u64,
    /// Responses scoring below this require follow-up
    pub follow_up_below: f64,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            throttle_rate: 0.5,
            adjust_factor: 1.2,
            max_override_ratio: 1.5,
            override_ttl_secs: 15 * 60,
            follow_up_below: 0.7,
        }
    }
}

/// Ledger capacities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub adjustment_capacity: usize,
    pub response_capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            adjustment_capacity: 1000,
            response_capacity: 500,
        }
    }
}

/// How persisted documents are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Hand writes to a sidecar thread; callers never wait on disk
    #[default]
    Deferred,
    /// Write on the calling thread (still best-effort)
    Immediate,
}

/// Where the JSON documents live
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the history and baseline documents; `None` keeps
    /// everything in memory
    pub directory: Option<PathBuf>,
    pub write_mode: WriteMode,
}

impl StorageConfig {
    pub const ADJUSTMENT_HISTORY_FILE: &'static str = "threshold_history.json";
    pub const RESPONSE_HISTORY_FILE: &'static str = "response_history.json";
    pub const BASELINE_FILE: &'static str = "baseline.json";

    fn file(&self, name: &str) -> Option<PathBuf> {
        self.directory.as_ref().map(|d| d.join(name))
    }

    pub fn adjustment_history_path(&self) -> Option<PathBuf> {
        self.file(Self::ADJUSTMENT_HISTORY_FILE)
    }

    pub fn response_history_path(&self) -> Option<PathBuf> {
        self.file(Self::RESPONSE_HISTORY_FILE)
    }

    pub fn baseline_path(&self) -> Option<PathBuf> {
        self.file(Self::BASELINE_FILE)
    }
}

/// Full engine configuration
///
/// # Example
/// ```
/// use perfguard::config::EngineConfig;
///
/// let config = EngineConfig::from_toml_str(r#"
///     [adjustment]
///     max_change_ratio = 0.2
///
///     [thresholds]
///     executionTime = 2500.0
/// "#).unwrap();
/// assert_eq!(config.adjustment.max_change_ratio, 0.2);
/// assert_eq!(config.adjustment.min_samples, 10);
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub adjustment: AdjustmentConfig,
    pub trend: TrendConfig,
    pub anomaly: AnomalyConfig,
    pub degradation: DegradationConfig,
    pub response: ResponseConfig,
    pub history: HistoryConfig,
    pub storage: StorageConfig,
    /// Overrides for the built-in default thresholds, keyed by metric name
    pub thresholds: BTreeMap<String, f64>,
}

impl EngineConfig {
    /// Tighter guard rails: smaller moves, more evidence required
    pub fn strict() -> Self {
        Self {
            adjustment: AdjustmentConfig {
                min_samples: 30,
                max_change_ratio: 0.15,
                ..AdjustmentConfig::default()
            },
            trend: TrendConfig {
                min_points: 20,
                ..TrendConfig::default()
            },
            ..Self::default()
        }
    }

    /// Looser guard rails for early-stage tuning
    pub fn permissive() -> Self {
        Self {
            adjustment: AdjustmentConfig {
                max_change_ratio: 0.5,
                ..AdjustmentConfig::default()
            },
            degradation: DegradationConfig {
                deviation_threshold: 0.10,
                ..DegradationConfig::default()
            },
            ..Self::default()
        }
    }

    /// Parse a TOML document and validate it
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(input)?;
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&input)
    }

    /// Threshold overrides resolved to metrics
    pub fn threshold_overrides(&self) -> Result<BTreeMap<Metric, f64>, String> {
        self.thresholds
            .iter()
            .map(|(name, value)| Ok((name.parse::<Metric>()?, *value)))
            .collect()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        let a = &self.adjustment;
        let d = &self.degradation;
        for (name, value) in [
            ("adjustment.execution_time_margin", a.execution_time_margin),
            ("adjustment.memory_margin", a.memory_margin),
            ("adjustment.cpu_margin", a.cpu_margin),
            ("trend.deadband", self.trend.deadband),
            ("anomaly.warning_z", self.anomaly.warning_z),
            ("anomaly.critical_z", self.anomaly.critical_z),
            ("degradation.deviation_threshold", d.deviation_threshold),
            ("degradation.high_significance_z", d.high_significance_z),
            ("degradation.medium_significance_z", d.medium_significance_z),
            ("degradation.critical_slope", d.critical_slope),
        ] {
            if !value.is_finite() {
                return Err(format!("{} must be finite, got {}", name, value));
            }
        }
        if a.min_samples < 2 {
            return Err(format!(
                "adjustment.min_samples must be >= 2, got {}",
                a.min_samples
            ));
        }
        for (name, value) in [
            ("adjustment.strict_ratio", a.strict_ratio),
            ("adjustment.loose_ratio", a.loose_ratio),
            ("adjustment.max_change_ratio", a.max_change_ratio),
            ("adjustment.min_confidence", a.min_confidence),
            ("adjustment.need_confidence", a.need_confidence),
            ("adjustment.stable_confidence", a.stable_confidence),
            ("degradation.trend_confidence", self.degradation.trend_confidence),
            ("response.throttle_rate", self.response.throttle_rate),
            ("response.follow_up_below", self.response.follow_up_below),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{} must be in [0, 1], got {}", name, value));
            }
        }
        if a.loose_ratio >= a.strict_ratio {
            return Err(format!(
                "adjustment.loose_ratio ({}) must be below strict_ratio ({})",
                a.loose_ratio, a.strict_ratio
            ));
        }
        for metric in Metric::ADJUSTABLE {
            if a.margin(metric) < 1.0 {
                return Err(format!(
                    "margin for {} must be >= 1.0, got {}",
                    metric,
                    a.margin(metric)
                ));
            }
        }

        if self.trend.min_points < 3 {
            return Err(format!(
                "trend.min_points must be >= 3, got {}",
                self.trend.min_points
            ));
        }
        if self.trend.deadband < 0.0 {
            return Err(format!(
                "trend.deadband must be non-negative, got {}",
                self.trend.deadband
            ));
        }

        if self.anomaly.warning_z <= 0.0 || self.anomaly.critical_z < self.anomaly.warning_z {
            return Err(format!(
                "anomaly z-scores must satisfy 0 < warning_z <= critical_z, got {} / {}",
                self.anomaly.warning_z, self.anomaly.critical_z
            ));
        }

        if d.medium_significance_z > d.high_significance_z {
            return Err(format!(
                "degradation.medium_significance_z ({}) must not exceed high_significance_z ({})",
                d.medium_significance_z, d.high_significance_z
            ));
        }
        if d.window_capacity < self.trend.min_points {
            return Err(format!(
                "degradation.window_capacity ({}) must be >= trend.min_points ({})",
                d.window_capacity, self.trend.min_points
            ));
        }

        if !(self.response.adjust_factor.is_finite() && self.response.adjust_factor > 1.0) {
            return Err(format!(
                "response.adjust_factor must be a finite number > 1.0, got {}",
                self.response.adjust_factor
            ));
        }
        let ratio = self.response.max_override_ratio;
        if !(ratio.is_finite() && ratio >= self.response.adjust_factor) {
            return Err(format!(
                "response.max_override_ratio ({}) must be finite and >= response.adjust_factor ({})",
                ratio, self.response.adjust_factor
            ));
        }

        if self.history.adjustment_capacity == 0 || self.history.response_capacity == 0 {
            return Err("history capacities must be > 0".to_string());
        }

        for (metric, value) in &self.threshold_overrides()? {
            if !value.is_finite() || *value <= 0.0 {
                return Err(format!(
                    "threshold for {} must be a positive number, got {}",
                    metric, value
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.adjustment.min_samples, 10);
        assert_eq!(config.adjustment.max_change_ratio, 0.30);
        assert_eq!(config.history.adjustment_capacity, 1000);
        assert_eq!(config.history.response_capacity, 500);
        assert_eq!(config.storage.write_mode, WriteMode::Deferred);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets_validate() {
        assert!(EngineConfig::strict().validate().is_ok());
        assert!(EngineConfig::permissive().validate().is_ok());
        assert!(
            EngineConfig::strict().adjustment.max_change_ratio
                < EngineConfig::default().adjustment.max_change_ratio
        );
    }

    #[test]
    fn test_margins() {
        let a = AdjustmentConfig::default();
        assert_eq!(a.margin(Metric::ExecutionTime), 1.2);
        assert_eq!(a.margin(Metric::MemoryUsage), 1.1);
    }

    #[test]
    fn test_from_toml_partial_sections() {
        let config = EngineConfig::from_toml_str(
            r#"
            [storage]
            directory = "/var/lib/perfguard"
            write_mode = "immediate"

            [response]
            override_ttl_secs = 60
            "#,
        )
        .unwrap();
        assert_eq!(config.storage.write_mode, WriteMode::Immediate);
        assert_eq!(config.response.override_ttl_secs, 60);
        assert_eq!(config.response.adjust_factor, 1.2);
        assert_eq!(
            config.storage.baseline_path(),
            Some(PathBuf::from("/var/lib/perfguard/baseline.json"))
        );
    }

    #[test]
    fn test_invalid_ratio_rejected() {
        let err = EngineConfig::from_toml_str("[adjustment]\nmax_change_ratio = 1.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_invalid_toml_rejected() {
        let err = EngineConfig::from_toml_str("[adjustment\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    #[allow(clippy::field_reassign_with_default)]
    fn test_inverted_ratios_rejected() {
        let mut config = EngineConfig::default();
        config.adjustment.loose_ratio = 0.9;
        assert!(config.validate().is_err());
    }

    #[test]
    #[allow(clippy::field_reassign_with_default)]
    fn test_non_positive_threshold_override_rejected() {
        let mut config = EngineConfig::default();
        config.thresholds.insert("cpuUsage".to_string(), 0.0);
        assert!(config.validate().is_err());
    }

    #[test]
    #[allow(clippy::field_reassign_with_default)]
    fn test_unknown_threshold_metric_rejected() {
        let mut config = EngineConfig::default();
        config.thresholds.insert("latency".to_string(), 10.0);
        assert!(config.validate().is_err());
    }

    #[test]
    #[allow(clippy::field_reassign_with_default)]
    fn test_adjust_factor_must_relax() {
        for factor in [f64::NAN, f64::INFINITY, 0.0, -1.2, 0.8, 1.0] {
            let mut config = EngineConfig::default();
            config.response.adjust_factor = factor;
            let err = config.validate().unwrap_err();
            assert!(err.contains("response.adjust_factor"), "factor={}", factor);
        }
    }

    #[test]
    fn test_override_ratio_below_factor_rejected() {
        let err = EngineConfig::from_toml_str("[response]\nmax_override_ratio = 1.1\n").unwrap_err();
        assert!(err.to_string().contains("max_override_ratio"));

        let err = EngineConfig::from_toml_str("[response]\nmax_override_ratio = inf\n").unwrap_err();
        assert!(err.to_string().contains("max_override_ratio"));

        let config = EngineConfig::from_toml_str("[response]\nmax_override_ratio = 1.2\n").unwrap();
        assert_eq!(config.response.max_override_ratio, 1.2);
    }

    #[test]
    fn test_non_finite_degradation_settings_rejected() {
        let err = EngineConfig::from_toml_str("[degradation]\ncritical_slope = nan\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref m) if m.contains("critical_slope")));

        let err =
            EngineConfig::from_toml_str("[degradation]\ndeviation_threshold = inf\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref m) if m.contains("deviation_threshold")));

        let err =
            EngineConfig::from_toml_str("[degradation]\nhigh_significance_z = nan\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref m) if m.contains("high_significance_z")));
    }

    #[test]
    fn test_window_shorter_than_trend_rejected() {
        let err = EngineConfig::from_toml_str(
            "[trend]\nmin_points = 20\n\n[degradation]\nwindow_capacity = 15\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref m) if m.contains("window_capacity")));

        assert!(EngineConfig::from_toml_str(
            "[trend]\nmin_points = 20\n\n[degradation]\nwindow_capacity = 20\n",
        )
        .is_ok());
    }

    #[test]
    fn test_no_storage_means_no_paths() {
        let storage = StorageConfig::default();
        assert!(storage.adjustment_history_path().is_none());
        assert!(storage.baseline_path().is_none());
    }
}
