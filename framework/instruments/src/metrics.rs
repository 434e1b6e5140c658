use opentelemetry_api::global::meter_with_version;
use opentelemetry_api::metrics::{Counter, Histogram, Meter, Unit};

pub type DeleteLatencyMetric = Histogram<f64>;
pub type ErrorCountMetric = Counter<u64>;

fn pvc_bench_meter() -> Meter {
    meter_with_version(
        "pvcbench",
        Some(env!("CARGO_PKG_VERSION")),
        None::<&'static str>,
        None::<Vec<_>>,
    )
}

pub fn create_delete_latency_metric() -> DeleteLatencyMetric {
    pvc_bench_meter()
        .f64_histogram("pvcbench.pvc.delete_latency")
        .with_unit(Unit::new("s"))
        .with_description("Latency from PVC deletion timestamp to actual deletion")
        .init()
}

pub fn create_error_count_metric() -> ErrorCountMetric {
    pvc_bench_meter()
        .u64_counter("pvcbench.errors")
        .with_description("Total number of errors during benchmark")
        .init()
}
