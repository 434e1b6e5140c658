use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use pvc_bench_core::prelude::DelegatedShutdownListener;
use pvc_bench_instruments::BenchMetrics;

/// Displays a spinner while the run is in progress, showing how many pods and terminating claims
/// remain according to the metrics.
///
/// The spinner stops when the run shuts down or when the returned bar is finished.
pub fn start_progress(
    metrics: Arc<BenchMetrics>,
    shutdown_listener: DelegatedShutdownListener,
) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
            .expect("Failed to set progress style"),
    );

    let thread_pb = pb.clone();
    std::thread::Builder::new()
        .name("progress".to_string())
        .spawn(move || loop {
            if shutdown_listener.should_shutdown() || thread_pb.is_finished() {
                log::trace!("Progress thread shutting down");
                thread_pb.finish_and_clear();
                break;
            }

            let snapshot = metrics.snapshot();
            thread_pb.set_message(format!(
                "pods remaining: {}, PVCs terminating: {}",
                snapshot.pods_remaining, snapshot.pvcs_terminating
            ));
            thread_pb.tick();
            std::thread::sleep(Duration::from_millis(250));
        })
        .expect("Failed to start progress thread");

    pb
}
