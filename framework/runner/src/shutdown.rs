use std::time::Duration;

use pvc_bench_core::prelude::{ShutdownHandle, ShutdownReason};
use tokio::signal;

pub(crate) fn start_shutdown_listener(
    runtime: &tokio::runtime::Runtime,
) -> anyhow::Result<ShutdownHandle> {
    let handle = ShutdownHandle::default();

    let listener_handle = handle.clone();
    runtime.spawn(async move {
        signal::ctrl_c()
            .await
            .expect("Failed to receive Ctrl-C signal");
        listener_handle.shutdown(ShutdownReason::Interrupted);
        println!("Received shutdown signal, shutting down...");
    });

    Ok(handle)
}

/// Shut the run down with [ShutdownReason::DeadlineExceeded] once `timeout` has elapsed.
pub(crate) fn start_deadline(
    runtime: &tokio::runtime::Runtime,
    handle: &ShutdownHandle,
    timeout: Duration,
) {
    let handle = handle.clone();
    runtime.spawn(async move {
        tokio::time::sleep(timeout).await;
        log::warn!("Run deadline of {timeout:?} exceeded, shutting down");
        handle.shutdown(ShutdownReason::DeadlineExceeded);
    });
}
