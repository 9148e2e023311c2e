//! Linear trend analysis over metric time series
//!
//! Ordinary least squares against the sample index (0..N-1):
//!
//! ```text
//! slope     = (NΣxy − ΣxΣy) / (NΣxx − (Σx)²)
//! intercept = (Σy − slope·Σx) / N
//! r         = (NΣxy − ΣxΣy) / sqrt((NΣxx − (Σx)²)(NΣyy − (Σy)²))
//! ```
//!
//! Direction uses a deadband around zero so numerical noise is reported as
//! stable. A series with zero variance has no defined correlation; it is
//! reported as a stable, zero-confidence trend rather than NaN.

use crate::config::TrendConfig;
use crate::metrics::{Metric, MetricSample};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which way a metric is moving
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Improving,
    Degrading,
    Stable,
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TrendDirection::Improving => "improving",
            TrendDirection::Degrading => "degrading",
            TrendDirection::Stable => "stable",
        })
    }
}

/// Extrapolated value `horizon` samples past the last observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub horizon: u32,
    pub value: f64,
}

/// Trend fitted to one metric's series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendResult {
    pub metric: Metric,
    pub direction: TrendDirection,
    pub slope: f64,
    pub intercept: f64,
    /// Pearson correlation of (index, value), in [-1, 1]
    pub correlation: f64,
    /// |correlation|
    pub confidence: f64,
    pub current_value: f64,
    /// First sample of the series
    pub baseline_value: f64,
    pub forecasts: Vec<Forecast>,
    pub description: String,
}

impl TrendResult {
    /// Relative change from first to last sample, positive when worse
    pub fn relative_change(&self) -> Option<f64> {
        if self.baseline_value == 0.0 {
            return None;
        }
        Some(
            self.metric.worsening(self.current_value, self.baseline_value)
                / self.baseline_value.abs(),
        )
    }
}

/// Raw least-squares fit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    /// `None` when either variable has zero variance
    pub correlation: Option<f64>,
}

/// Least-squares fit of `series` against its index
///
/// Returns `None` for fewer than two points.
pub fn linear_fit(series: &[f64]) -> Option<LinearFit> {
    if series.len() < 2 {
        return None;
    }
    let n = series.len() as f64;
    let (mut sx, mut sy, mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for (i, y) in series.iter().enumerate() {
        let x = i as f64;
        sx += x;
        sy += y;
        sxy += x * y;
        sxx += x * x;
        syy += y * y;
    }

    let cov = n * sxy - sx * sy;
    let var_x = n * sxx - sx * sx;
    let var_y = n * syy - sy * sy;

    let slope = cov / var_x;
    let intercept = (sy - slope * sx) / n;

    // Cancellation leaves var_y slightly off zero for constant series, so
    // flatness is decided on the values themselves
    let flat = series.iter().all(|v| *v == series[0]);
    let correlation = if !flat && var_y > f64::EPSILON * (n * syy).abs() {
        Some((cov / (var_x * var_y).sqrt()).clamp(-1.0, 1.0))
    } else {
        None
    };

    Some(LinearFit {
        slope,
        intercept,
        correlation,
    })
}

/// Fits trends and classifies their direction
#[derive(Debug, Clone)]
pub struct TrendAnalyzer {
    config: TrendConfig,
}

impl TrendAnalyzer {
    pub fn new(config: TrendConfig) -> Self {
        Self { config }
    }

    /// Classify a slope for `metric` using the deadband
    pub fn classify(&self, metric: Metric, slope: f64) -> TrendDirection {
        let worsening = slope * metric.worsening_sign();
        if worsening > self.config.deadband {
            TrendDirection::Degrading
        } else if worsening < -self.config.deadband {
            TrendDirection::Improving
        } else {
            TrendDirection::Stable
        }
    }

    /// Analyze one series; `None` when it is shorter than `min_points`
    pub fn analyze(&self, metric: Metric, series: &[f64]) -> Option<TrendResult> {
        if series.len() < self.config.min_points {
            return None;
        }
        let fit = linear_fit(series)?;
        let current_value = series[series.len() - 1];
        let baseline_value = series[0];

        let Some(correlation) = fit.correlation else {
            return Some(TrendResult {
                metric,
                direction: TrendDirection::Stable,
                slope: 0.0,
                intercept: baseline_value,
                correlation: 0.0,
                confidence: 0.0,
                current_value,
                baseline_value,
                forecasts: self.forecast(0.0, baseline_value, series.len()),
                description: format!("{} is flat at {:.2}", metric, baseline_value),
            });
        };

        let direction = self.classify(metric, fit.slope);
        let description = format!(
            "{} is {} (slope {:+.4} per sample, r={:.2}): {:.2} → {:.2}",
            metric, direction, fit.slope, correlation, baseline_value, current_value
        );

        Some(TrendResult {
            metric,
            direction,
            slope: fit.slope,
            intercept: fit.intercept,
            correlation,
            confidence: correlation.abs(),
            current_value,
            baseline_value,
            forecasts: self.forecast(fit.slope, fit.intercept, series.len()),
            description,
        })
    }

    /// Trends for every metric in a sample history
    pub fn analyze_history(&self, history: &[MetricSample]) -> Vec<TrendResult> {
        Metric::ALL
            .iter()
            .filter_map(|m| self.analyze(*m, &MetricSample::series(history, *m)))
            .collect()
    }

    fn forecast(&self, slope: f64, intercept: f64, len: usize) -> Vec<Forecast> {
        let last = (len - 1) as f64;
        self.config
            .horizons
            .iter()
            .map(|h| Forecast {
                horizon: *h,
                value: intercept + slope * (last + *h as f64),
            })
            .collect()
    }
}
