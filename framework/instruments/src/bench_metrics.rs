use std::collections::BTreeMap;
use std::time::Duration;

use opentelemetry_api::KeyValue;
use parking_lot::Mutex;

use crate::metrics::{
    create_delete_latency_metric, create_error_count_metric, DeleteLatencyMetric,
    ErrorCountMetric,
};
use crate::DEFAULT_LATENCY_BUCKETS;

/// The labels that identify a benchmark run on the run-level instruments.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunLabels {
    pub scenario: String,
    pub pvc_size: String,
    pub replicas: u32,
}

impl RunLabels {
    pub fn new(scenario: impl Into<String>, pvc_size: impl Into<String>, replicas: u32) -> Self {
        Self {
            scenario: scenario.into(),
            pvc_size: pvc_size.into(),
            replicas,
        }
    }

    fn key_values(&self) -> Vec<KeyValue> {
        vec![
            KeyValue::new("scenario", self.scenario.clone()),
            KeyValue::new("pvc_size", self.pvc_size.clone()),
            KeyValue::new("replicas", self.replicas.to_string()),
        ]
    }
}

/// Point in time state of a latency histogram.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSnapshot {
    /// Upper bounds, in seconds, matching [HistogramSnapshot::bucket_counts] by index.
    pub bounds: Vec<f64>,
    /// Cumulative count of observations less than or equal to each bound.
    pub bucket_counts: Vec<u64>,
    pub count: u64,
    pub sum_seconds: f64,
}

impl HistogramSnapshot {
    fn new() -> Self {
        Self {
            bounds: DEFAULT_LATENCY_BUCKETS.to_vec(),
            bucket_counts: vec![0; DEFAULT_LATENCY_BUCKETS.len()],
            count: 0,
            sum_seconds: 0.0,
        }
    }

    fn observe(&mut self, seconds: f64) {
        for (bound, count) in self.bounds.iter().zip(self.bucket_counts.iter_mut()) {
            if seconds <= *bound {
                *count += 1;
            }
        }
        self.count += 1;
        self.sum_seconds += seconds;
    }
}

/// A copy of every instrument value, taken by [BenchMetrics::snapshot].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    /// `pvcbench_run_info`, 1 while a run with these labels is in flight.
    pub run_info: BTreeMap<RunLabels, u8>,
    /// `pvcbench_total_duration_seconds` of the last successful run with these labels.
    pub total_duration: BTreeMap<RunLabels, Duration>,
    /// `pvcbench_pvc_delete_latency_seconds`, keyed by run labels and namespace group.
    pub delete_latency: BTreeMap<(RunLabels, String), HistogramSnapshot>,
    /// `pvcbench_errors_total`, keyed by the stage that failed.
    pub errors: BTreeMap<String, u64>,
    /// `pvcbench_progress_pods_remaining`
    pub pods_remaining: i64,
    /// `pvcbench_progress_pvcs_terminating`
    pub pvcs_terminating: i64,
}

/// The metrics sink for benchmark runs.
///
/// Instances are independent of each other, so tests and concurrent runs can each use their own.
/// Share one between components with an `Arc`. Latency observations and error counts are also
/// forwarded to OpenTelemetry instruments on the global meter.
pub struct BenchMetrics {
    state: Mutex<MetricsSnapshot>,
    delete_latency_metric: DeleteLatencyMetric,
    error_count_metric: ErrorCountMetric,
}

impl Default for BenchMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BenchMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BenchMetrics")
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl BenchMetrics {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MetricsSnapshot::default()),
            delete_latency_metric: create_delete_latency_metric(),
            error_count_metric: create_error_count_metric(),
        }
    }

    pub fn set_run_active(&self, labels: &RunLabels, active: bool) {
        self.state
            .lock()
            .run_info
            .insert(labels.clone(), u8::from(active));
    }

    pub fn set_total_duration(&self, labels: &RunLabels, duration: Duration) {
        self.state
            .lock()
            .total_duration
            .insert(labels.clone(), duration);
    }

    pub fn observe_delete_latency(&self, labels: &RunLabels, ns_group: &str, latency: Duration) {
        let seconds = latency.as_secs_f64();
        self.state
            .lock()
            .delete_latency
            .entry((labels.clone(), ns_group.to_string()))
            .or_insert_with(HistogramSnapshot::new)
            .observe(seconds);

        let mut attributes = labels.key_values();
        attributes.push(KeyValue::new("ns_group", ns_group.to_string()));
        self.delete_latency_metric.record(seconds, &attributes);
    }

    pub fn inc_error(&self, stage: &str) {
        *self
            .state
            .lock()
            .errors
            .entry(stage.to_string())
            .or_default() += 1;

        self.error_count_metric
            .add(1, &[KeyValue::new("type", stage.to_string())]);
    }

    pub fn set_pods_remaining(&self, remaining: u32) {
        self.state.lock().pods_remaining = i64::from(remaining);
    }

    pub fn inc_terminating(&self) {
        self.state.lock().pvcs_terminating += 1;
    }

    pub fn dec_terminating(&self) {
        self.state.lock().pvcs_terminating -= 1;
    }

    pub fn reset_terminating(&self) {
        self.state.lock().pvcs_terminating = 0;
    }

    /// Reset both progress gauges, used when a run is abandoned part way through.
    pub fn reset_progress(&self) {
        let mut state = self.state.lock();
        state.pods_remaining = 0;
        state.pvcs_terminating = 0;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.state.lock().clone()
    }
}
