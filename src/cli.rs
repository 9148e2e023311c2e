//! CLI argument parsing for Perfguard

use crate::metrics::Metric;
use crate::thresholds::ViolationSeverity;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    Text,
    /// JSON format for machine parsing
    Json,
}

/// Severity accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SeverityArg {
    Low,
    Medium,
    High,
    Critical,
}

impl From<SeverityArg> for ViolationSeverity {
    fn from(arg: SeverityArg) -> Self {
        match arg {
            SeverityArg::Low => ViolationSeverity::Low,
            SeverityArg::Medium => ViolationSeverity::Medium,
            SeverityArg::High => ViolationSeverity::High,
            SeverityArg::Critical => ViolationSeverity::Critical,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "perfguard")]
#[command(version)]
#[command(about = "Adaptive performance thresholds and degradation response", long_about = None)]
pub struct Cli {
    /// Engine configuration file (TOML)
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding threshold/response history and the baseline snapshot
    #[arg(long = "state-dir", value_name = "DIR", global = true)]
    pub state_dir: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long = "format", value_enum, default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Enable debug tracing output to stderr
    #[arg(long = "debug", global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one statistical threshold adjustment round over a sample file
    Adjust {
        /// JSON array of metric samples
        #[arg(value_name = "SAMPLES")]
        samples: PathBuf,
    },
    /// Check the newest sample for degradation (earlier samples seed the trend window)
    Detect {
        #[arg(value_name = "SAMPLES")]
        samples: PathBuf,
    },
    /// Fit a linear trend per metric
    Trends {
        #[arg(value_name = "SAMPLES")]
        samples: PathBuf,
    },
    /// Z-score anomaly scan per metric
    Anomalies {
        #[arg(value_name = "SAMPLES")]
        samples: PathBuf,
    },
    /// Handle a single threshold violation
    Violation {
        /// Metric name (executionTime, memoryUsage, cpuUsage, errorRate, throughput)
        #[arg(short, long)]
        metric: Metric,

        /// Observed value
        #[arg(long)]
        value: f64,

        /// Threshold that was breached
        #[arg(long)]
        threshold: f64,

        /// Override the assessed severity
        #[arg(long, value_enum)]
        severity: Option<SeverityArg>,

        /// Operation the violation belongs to
        #[arg(long = "operation-id")]
        operation_id: Option<String>,
    },
    /// Check every sample against the enforced thresholds
    Check {
        #[arg(value_name = "SAMPLES")]
        samples: PathBuf,

        /// Run the automated response for each violation found
        #[arg(long)]
        respond: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_adjust() {
        let cli = Cli::parse_from(["perfguard", "adjust", "samples.json"]);
        assert!(matches!(cli.command, Command::Adjust { ref samples } if samples == &PathBuf::from("samples.json")));
        assert_eq!(cli.format, OutputFormat::Text);
        assert!(!cli.debug);
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "perfguard",
            "detect",
            "s.json",
            "--format",
            "json",
            "--state-dir",
            "/tmp/state",
            "--debug",
        ]);
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.state_dir, Some(PathBuf::from("/tmp/state")));
        assert!(cli.debug);
    }

    #[test]
    fn test_cli_violation_args() {
        let cli = Cli::parse_from([
            "perfguard",
            "violation",
            "--metric",
            "cpuUsage",
            "--value",
            "95",
            "--threshold",
            "80",
            "--severity",
            "high",
        ]);
        match cli.command {
            Command::Violation {
                metric,
                value,
                threshold,
                severity,
                operation_id,
            } => {
                assert_eq!(metric, Metric::CpuUsage);
                assert_eq!(value, 95.0);
                assert_eq!(threshold, 80.0);
                assert_eq!(severity, Some(SeverityArg::High));
                assert!(operation_id.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_metric() {
        let result = Cli::try_parse_from([
            "perfguard",
            "violation",
            "--metric",
            "latency",
            "--value",
            "1",
            "--threshold",
            "1",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_check_respond_flag() {
        let cli = Cli::parse_from(["perfguard", "check", "s.json", "--respond"]);
        assert!(matches!(cli.command, Command::Check { respond: true, .. }));
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["perfguard"]).is_err());
    }
}
