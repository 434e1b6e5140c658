mod bench_metrics;
mod metrics;
mod report;
mod stats;

pub use bench_metrics::{BenchMetrics, HistogramSnapshot, MetricsSnapshot, RunLabels};
pub use report::{print_metrics_report, render_metrics_report};
pub use stats::{LatencySample, LatencyStats};

/// Buckets used for the deletion latency histogram, in seconds.
pub const DEFAULT_LATENCY_BUCKETS: [f64; 11] =
    [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];
