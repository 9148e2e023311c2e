use anyhow::{Context, Result};
use clap::Parser;
use perfguard::anomaly::Anomaly;
use perfguard::audit::{AuditSink, JsonLinesAuditSink, TracingAuditSink};
use perfguard::cli::{Cli, Command, OutputFormat};
use perfguard::config::EngineConfig;
use perfguard::engine::PerformanceEngine;
use perfguard::metrics::MetricSample;
use perfguard::response::ResponseResult;
use perfguard::thresholds::Violation;
use perfguard::trend::TrendResult;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const AUDIT_FILE: &str = "audit.jsonl";

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

fn read_samples(path: &Path) -> Result<Vec<MetricSample>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read samples from {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse samples in {}", path.display()))
}

fn load_config(args: &Cli) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("Invalid configuration {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(dir) = &args.state_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create state directory {}", dir.display()))?;
        config.storage.directory = Some(dir.clone());
    }
    Ok(config)
}

fn open_engine(args: &Cli) -> Result<PerformanceEngine> {
    let config = load_config(args)?;
    let audit: Arc<dyn AuditSink> = match &config.storage.directory {
        Some(dir) => Arc::new(JsonLinesAuditSink::new(dir.join(AUDIT_FILE))),
        None => Arc::new(TracingAuditSink),
    };
    PerformanceEngine::open(config, audit).context("Failed to start engine")
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn trends_report(trends: &[TrendResult]) -> String {
    if trends.is_empty() {
        return "⚠️  Not enough data for trend analysis\n".to_string();
    }
    let mut report = String::from("📈 TRENDS\n\n");
    for t in trends {
        report.push_str(&format!("  {}\n", t.description));
        let forecasts: Vec<String> = t
            .forecasts
            .iter()
            .map(|f| format!("+{}: {:.2}", f.horizon, f.value))
            .collect();
        report.push_str(&format!("    forecast {}\n", forecasts.join(", ")));
    }
    report
}

fn anomalies_report(anomalies: &[Anomaly]) -> String {
    if anomalies.is_empty() {
        return "✅ NO ANOMALIES\n".to_string();
    }
    let mut report = format!("🔍 {} ANOMALIES\n\n", anomalies.len());
    for a in anomalies {
        report.push_str(&format!(
            "  [{:?}] {} = {:.2} at {} (expected {:.2}, z={:.2})\n",
            a.severity, a.metric, a.value, a.timestamp, a.expected_value, a.deviation
        ));
    }
    report
}

fn violations_report(violations: &[Violation], responses: &[ResponseResult]) -> String {
    if violations.is_empty() {
        return "✅ NO VIOLATIONS\n".to_string();
    }
    let mut report = format!("❌ {} VIOLATIONS\n\n", violations.len());
    for v in violations {
        report.push_str(&format!(
            "  {} = {:.2} (threshold {:.2})\n",
            v.metric, v.value, v.threshold
        ));
    }
    for r in responses {
        report.push('\n');
        report.push_str(&r.to_report_string());
    }
    report
}

#[derive(Serialize)]
struct CheckOutput<'a> {
    violations: &'a [Violation],
    responses: &'a [ResponseResult],
}

fn run(args: Cli) -> Result<()> {
    let mut engine = open_engine(&args)?;
    let json = args.format == OutputFormat::Json;

    match &args.command {
        Command::Adjust { samples } => {
            let samples = read_samples(samples)?;
            let result = engine.adjust_thresholds_dynamically(&samples);
            if json {
                print_json(&result)?;
            } else {
                print!("{}", result.to_report_string());
            }
        }
        Command::Detect { samples } => {
            let mut samples = read_samples(samples)?;
            let current = samples
                .pop()
                .context("Sample file is empty; nothing to check")?;
            for sample in samples {
                engine.record_sample(sample);
            }
            let result = engine.detect_degradation(current);
            if json {
                print_json(&result)?;
            } else {
                print!("{}", result.to_report_string());
            }
        }
        Command::Trends { samples } => {
            let trends = engine.analyze_trends(&read_samples(samples)?);
            if json {
                print_json(&trends)?;
            } else {
                print!("{}", trends_report(&trends));
            }
        }
        Command::Anomalies { samples } => {
            let anomalies = engine.detect_anomalies(&read_samples(samples)?);
            if json {
                print_json(&anomalies)?;
            } else {
                print!("{}", anomalies_report(&anomalies));
            }
        }
        Command::Violation {
            metric,
            value,
            threshold,
            severity,
            operation_id,
        } => {
            let mut violation = Violation::new(*metric, *value, *threshold);
            if let Some(severity) = severity {
                violation = violation.with_severity((*severity).into());
            }
            if let Some(id) = operation_id {
                violation = violation.with_operation_id(id.clone());
            }
            let response = engine.handle_threshold_violation(violation);
            if json {
                print_json(&response)?;
            } else {
                print!("{}", response.to_report_string());
            }
        }
        Command::Check { samples, respond } => {
            let mut violations = Vec::new();
            for sample in read_samples(samples)? {
                violations.extend(engine.check_sample(&sample));
            }
            let responses: Vec<ResponseResult> = if *respond {
                violations
                    .iter()
                    .map(|v| engine.handle_threshold_violation(v.clone()))
                    .collect()
            } else {
                Vec::new()
            };
            if json {
                print_json(&CheckOutput {
                    violations: &violations,
                    responses: &responses,
                })?;
            } else {
                print!("{}", violations_report(&violations, &responses));
            }
        }
    }

    engine.flush();
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();

    // Initialize tracing if --debug flag is set
    init_tracing(args.debug);

    run(args)
}
