use std::time::Duration;

/// Returned when a bounded wait gives up before its condition was met.
///
/// This is distinct from [crate::prelude::ShutdownSignalError], which means the whole run was
/// cancelled, and from platform errors, which mean the condition could not be evaluated.
#[derive(derive_more::Error, derive_more::Display, Debug, Clone, PartialEq, Eq)]
#[display("Timed out after {waited:?} waiting for {what}")]
pub struct WaitTimeoutError {
    what: String,
    waited: Duration,
}

impl WaitTimeoutError {
    pub fn new(what: impl Into<String>, waited: Duration) -> Self {
        Self {
            what: what.into(),
            waited,
        }
    }

    pub fn what(&self) -> &str {
        &self.what
    }

    pub fn waited(&self) -> Duration {
        self.waited
    }
}
