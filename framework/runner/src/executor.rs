use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use pvc_bench_core::prelude::{ShutdownHandle, ShutdownSignalError};

use crate::shutdown::{start_deadline, start_shutdown_listener};

/// Owns the Tokio runtime for a benchmark process and the shutdown handle that cancels it.
#[derive(Debug)]
pub struct Executor {
    runtime: tokio::runtime::Runtime,
    shutdown_handle: ShutdownHandle,
}

impl Executor {
    /// Create the runtime and listen for Ctrl-C. If `timeout` is set, the run is shut down with a
    /// deadline error once it elapses.
    pub fn start(timeout: Option<Duration>) -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
        let shutdown_handle = start_shutdown_listener(&runtime)?;
        if let Some(timeout) = timeout {
            start_deadline(&runtime, &shutdown_handle, timeout);
        }

        Ok(Self {
            runtime,
            shutdown_handle,
        })
    }

    pub fn shutdown_handle(&self) -> &ShutdownHandle {
        &self.shutdown_handle
    }

    /// Run async code in place, blocking until it completes.
    ///
    /// Note that the future will be cancelled if the runner is shutdown, with a
    /// [ShutdownSignalError] returned in its place. Work that holds resources should release them
    /// on drop.
    ///
    /// The future is always polled before the shutdown signal, so work that watches its own
    /// shutdown listener gets to return its own error first.
    pub fn execute_in_place<T>(
        &self,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> anyhow::Result<T> {
        let mut shutdown_listener = self.shutdown_handle.new_listener();
        self.runtime.block_on(async move {
            tokio::select! {
                biased;

                result = fut => result,
                reason = shutdown_listener.wait_for_shutdown() => {
                    Err(anyhow::anyhow!(ShutdownSignalError::new(reason)))
                },
            }
        })
    }

    /// Submit async code to be run in the background.
    ///
    /// Note that the future will not be cancelled if the runner is shutdown.
    pub fn spawn(&self, fut: impl Future<Output = ()> + Send + 'static) {
        self.runtime.spawn(fut);
    }
}
