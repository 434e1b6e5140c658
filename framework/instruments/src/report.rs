mod metrics_table;

use std::fmt::Write;

use tabled::settings::Style;
use tabled::Table;

use crate::report::metrics_table::{ErrorRow, LatencyHistogramRow, RunRow};
use crate::MetricsSnapshot;

/// Render the metrics snapshot as tables, for printing at the end of a run.
pub fn render_metrics_report(snapshot: &MetricsSnapshot) -> String {
    let mut out = String::new();

    let runs = snapshot
        .run_info
        .iter()
        .map(|(labels, active)| RunRow {
            scenario: labels.scenario.clone(),
            pvc_size: labels.pvc_size.clone(),
            replicas: labels.replicas,
            active: *active,
            total_duration_s: snapshot
                .total_duration
                .get(labels)
                .map(|d| d.as_secs_f64()),
        })
        .collect::<Vec<_>>();
    if !runs.is_empty() {
        let mut table = Table::new(runs);
        table.with(Style::modern());
        let _ = writeln!(out, "\nRuns\n{table}");
    }

    let histograms = snapshot
        .delete_latency
        .iter()
        .map(|((labels, ns_group), histogram)| LatencyHistogramRow {
            scenario: labels.scenario.clone(),
            ns_group: ns_group.clone(),
            count: histogram.count,
            sum_s: histogram.sum_seconds,
            mean_s: if histogram.count == 0 {
                0.0
            } else {
                histogram.sum_seconds / histogram.count as f64
            },
        })
        .collect::<Vec<_>>();
    if !histograms.is_empty() {
        let mut table = Table::new(histograms);
        table.with(Style::modern());
        let _ = writeln!(out, "\nPVC delete latency histogram\n{table}");
    }

    let errors = snapshot
        .errors
        .iter()
        .map(|(stage, count)| ErrorRow {
            stage: stage.clone(),
            count: *count,
        })
        .collect::<Vec<_>>();
    if !errors.is_empty() {
        let mut table = Table::new(errors);
        table.with(Style::modern());
        let _ = writeln!(out, "\nErrors\n{table}");
    }

    let _ = writeln!(
        out,
        "\nPods remaining: {}, PVCs terminating: {}",
        snapshot.pods_remaining, snapshot.pvcs_terminating
    );

    out
}

pub fn print_metrics_report(snapshot: &MetricsSnapshot) {
    println!("{}", render_metrics_report(snapshot));
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{BenchMetrics, RunLabels};

    #[test]
    fn report_lists_every_instrument() {
        let metrics = BenchMetrics::new();
        let labels = RunLabels::new("staggered", "1Gi", 4);
        metrics.set_run_active(&labels, false);
        metrics.set_total_duration(&labels, Duration::from_millis(1500));
        metrics.observe_delete_latency(&labels, "single", Duration::from_millis(250));
        metrics.inc_error("pvc_delete_poll");

        let report = render_metrics_report(&metrics.snapshot());

        assert!(report.contains("staggered"), "{report}");
        assert!(report.contains("1.50"), "{report}");
        assert!(report.contains("pvc_delete_poll"), "{report}");
        assert!(report.contains("Pods remaining: 0, PVCs terminating: 0"), "{report}");
    }

    #[test]
    fn empty_snapshot_only_reports_gauges() {
        let report = render_metrics_report(&MetricsSnapshot::default());
        assert!(!report.contains("Runs"), "{report}");
        assert!(report.contains("Pods remaining: 0"), "{report}");
    }
}
