use std::fmt::Write;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pvc_bench_summary_model::{LatencySummary, RunSummary};
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::config::{RunConfig, ScenarioKind};
use crate::scenario::RunResult;

#[derive(Tabled)]
struct SettingRow {
    setting: &'static str,
    value: String,
}

#[derive(Tabled)]
struct LatencyRow {
    count: usize,
    avg: String,
    p50: String,
    p90: String,
    p99: String,
}

/// Render the outcome of a run with the settings that produced it.
///
/// An empty latency sample is reported as such rather than as zero latency.
pub fn render_summary(config: &RunConfig, kubernetes_version: &str, result: &RunResult) -> String {
    let mut settings = vec![
        SettingRow {
            setting: "Total Duration",
            value: format!("{:?}", result.duration),
        },
        SettingRow {
            setting: "Scenario",
            value: config.scenario().name().to_string(),
        },
        SettingRow {
            setting: "Replicas",
            value: config.replicas().to_string(),
        },
        SettingRow {
            setting: "PVC Size",
            value: config.pvc_size().to_string(),
        },
    ];
    if !kubernetes_version.is_empty() {
        settings.push(SettingRow {
            setting: "Kubernetes Version",
            value: kubernetes_version.to_string(),
        });
    }
    if let ScenarioKind::Staggered {
        batch_size,
        interval,
    } = config.scenario()
    {
        settings.push(SettingRow {
            setting: "Delete Batch Size",
            value: batch_size.to_string(),
        });
        settings.push(SettingRow {
            setting: "Delete Interval",
            value: format!("{interval:?}"),
        });
    }
    settings.push(SettingRow {
        setting: "PVC Poll Interval",
        value: format!("{:?}", config.pvc_poll_interval()),
    });

    let mut out = String::new();
    let mut table = Table::new(settings);
    table.with(Style::modern());
    let _ = writeln!(out, "\nBenchmark Summary\n{table}");

    match result.latencies.stats() {
        Some(stats) => {
            let mut table = Table::new([LatencyRow {
                count: stats.count,
                avg: format!("{:?}", stats.avg),
                p50: format!("{:?}", stats.p50),
                p90: format!("{:?}", stats.p90),
                p99: format!("{:?}", stats.p99),
            }]);
            table.with(Style::modern());
            let _ = writeln!(out, "\nPVC Delete Latency\n{table}");
        }
        None => {
            let _ = writeln!(out, "\nNo PVC deletions recorded.");
        }
    }

    out
}

pub fn print_summary(config: &RunConfig, kubernetes_version: &str, result: &RunResult) {
    println!("{}", render_summary(config, kubernetes_version, result));
}

/// Build the exportable summary for a run.
pub fn to_run_summary(
    run_id: impl Into<String>,
    started_at: DateTime<Utc>,
    config: &RunConfig,
    kubernetes_version: &str,
    result: &RunResult,
) -> RunSummary {
    let (delete_batch_size, delete_interval_ms) = match config.scenario() {
        ScenarioKind::Burst => (None, None),
        ScenarioKind::Staggered {
            batch_size,
            interval,
        } => (Some(batch_size), Some(millis(interval) as u64)),
    };

    RunSummary {
        run_id: run_id.into(),
        scenario_name: config.scenario().name().to_string(),
        started_at: started_at.timestamp(),
        namespace: config.namespace().to_string(),
        replicas: config.replicas(),
        pvc_size: config.pvc_size().to_string(),
        delete_batch_size,
        delete_interval_ms,
        pvc_poll_interval_ms: millis(config.pvc_poll_interval()) as u64,
        kubernetes_version: kubernetes_version.to_string(),
        total_duration_ms: millis(result.duration),
        latency: result.latencies.stats().map(|stats| LatencySummary {
            count: stats.count,
            avg_ms: millis(stats.avg),
            p50_ms: millis(stats.p50),
            p90_ms: millis(stats.p90),
            p99_ms: millis(stats.p99),
        }),
        pvc_bench_version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}
