use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch::{Receiver, Sender};

/// Why a run was asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum ShutdownReason {
    /// The user interrupted the process, usually with Ctrl-C.
    #[display("interrupted")]
    Interrupted,
    /// The overall run deadline elapsed.
    #[display("run deadline exceeded")]
    DeadlineExceeded,
}

#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: Arc<Sender<Option<ShutdownReason>>>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self {
            sender: Arc::new(tokio::sync::watch::channel(None).0),
        }
    }

    /// Signal every listener to stop. Only the first reason is kept, later calls are ignored.
    pub fn shutdown(&self, reason: ShutdownReason) {
        let changed = self.sender.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        });

        if !changed {
            log::debug!("Ignoring shutdown signal ({reason}), already shutting down");
        }
    }

    /// The reason the handle was shut down with, if it has been.
    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.sender.borrow()
    }

    /// Create a listener. Listeners created after shutdown still observe it.
    pub fn new_listener(&self) -> DelegatedShutdownListener {
        DelegatedShutdownListener::new(self.sender.subscribe())
    }
}

#[derive(Clone, Debug)]
pub struct DelegatedShutdownListener {
    receiver: Receiver<Option<ShutdownReason>>,
}

impl DelegatedShutdownListener {
    pub(crate) fn new(receiver: Receiver<Option<ShutdownReason>>) -> Self {
        Self { receiver }
    }

    /// Point in time check if the shutdown signal has been received. If this returns true then work
    /// should be stopped so that the run can shut down.
    pub fn should_shutdown(&self) -> bool {
        self.receiver.borrow().is_some()
    }

    /// Return an error if the shutdown signal has already been received.
    pub fn check(&self) -> Result<(), ShutdownSignalError> {
        match *self.receiver.borrow() {
            Some(reason) => Err(ShutdownSignalError::new(reason)),
            None => Ok(()),
        }
    }

    /// Wait for the shutdown signal to be received. It is safe to race this with another future so
    /// that the shutdown signal can be used to cancel other work in progress.
    ///
    /// If every [ShutdownHandle] has been dropped without signalling then this never completes.
    pub async fn wait_for_shutdown(&mut self) -> ShutdownReason {
        let reason = match self.receiver.wait_for(Option::is_some).await {
            Ok(reason) => *reason,
            Err(_) => None,
        };

        match reason {
            Some(reason) => reason,
            None => std::future::pending().await,
        }
    }

    /// Sleep for `duration`, returning early with an error if shutdown is signalled first.
    pub async fn sleep(&mut self, duration: Duration) -> Result<(), ShutdownSignalError> {
        self.check()?;

        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            reason = self.wait_for_shutdown() => Err(ShutdownSignalError::new(reason)),
        }
    }
}

#[derive(derive_more::Error, derive_more::Display, Debug, Clone, Copy, PartialEq, Eq)]
#[display("Execution cancelled by shutdown signal: {reason}")]
pub struct ShutdownSignalError {
    reason: ShutdownReason,
}

impl ShutdownSignalError {
    pub fn new(reason: ShutdownReason) -> Self {
        Self { reason }
    }

    pub fn reason(&self) -> ShutdownReason {
        self.reason
    }
}

impl Default for ShutdownSignalError {
    fn default() -> Self {
        Self::new(ShutdownReason::Interrupted)
    }
}
