use std::future::Future;
use std::time::Duration;

use pvc_bench_core::prelude::DelegatedShutdownListener;
use pvc_bench_kube::prelude::{ClusterError, ClusterResult};
use rand::Rng;

/// Bounded exponential backoff for retrying optimistic-concurrency conflicts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub steps: u32,
    /// Delay before the first retry.
    pub initial: Duration,
    /// Multiplier applied to the delay after each retry.
    pub factor: f64,
    /// Up to this fraction of each delay is added at random.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    /// Four attempts starting at 10ms with a factor of 5 and 10% jitter.
    fn default() -> Self {
        Self {
            steps: 4,
            initial: Duration::from_millis(10),
            factor: 5.0,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// The delays slept between attempts, without jitter.
    pub fn delays(&self) -> Vec<Duration> {
        let mut delay = self.initial;
        let mut delays = Vec::new();
        for _ in 1..self.steps {
            delays.push(delay);
            delay = delay.mul_f64(self.factor);
        }
        delays
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter <= 0.0 {
            return delay;
        }

        let extra = rand::thread_rng().gen_range(0.0..=self.jitter);
        delay + delay.mul_f64(extra)
    }
}

/// Run `attempt` until it succeeds, fails with something other than a conflict, or the policy's
/// attempts run out. The last conflict is returned when retries are exhausted.
pub async fn retry_on_conflict<T, F, Fut>(
    policy: &RetryPolicy,
    shutdown_listener: &mut DelegatedShutdownListener,
    mut attempt: F,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ClusterResult<T>>,
{
    let mut delays = policy.delays().into_iter();
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e @ ClusterError::Conflict { .. }) => match delays.next() {
                Some(delay) => {
                    log::debug!("Retrying after conflict: {e}");
                    shutdown_listener.sleep(policy.jittered(delay)).await?;
                }
                None => return Err(e.into()),
            },
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pvc_bench_core::prelude::ShutdownHandle;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn conflict() -> ClusterError {
        ClusterError::Conflict {
            kind: "statefulset",
            name: "sts".to_string(),
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            initial: Duration::from_millis(1),
            jitter: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn default_delays() {
        assert_eq!(
            vec![
                Duration::from_millis(10),
                Duration::from_millis(50),
                Duration::from_millis(250)
            ],
            RetryPolicy::default().delays()
        );
    }

    #[tokio::test]
    async fn conflicts_are_retried_until_success() {
        let mut listener = ShutdownHandle::new().new_listener();
        let attempts = AtomicU32::new(0);
        let counter = &attempts;

        let value = retry_on_conflict(&fast_policy(), &mut listener, move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(conflict())
            } else {
                Ok(7)
            }
        })
        .await
        .unwrap();

        assert_eq!(7, value);
        assert_eq!(3, attempts.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let mut listener = ShutdownHandle::new().new_listener();
        let attempts = AtomicU32::new(0);
        let counter = &attempts;

        let err = retry_on_conflict(&fast_policy(), &mut listener, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(conflict())
        })
        .await
        .unwrap_err();

        assert!(err
            .downcast_ref::<ClusterError>()
            .is_some_and(ClusterError::is_conflict));
        assert_eq!(4, attempts.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let mut listener = ShutdownHandle::new().new_listener();
        let attempts = AtomicU32::new(0);
        let counter = &attempts;

        let err = retry_on_conflict(&fast_policy(), &mut listener, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(ClusterError::Api {
                kind: "statefulset",
                name: "sts".to_string(),
                code: 500,
                message: "boom".to_string(),
            })
        })
        .await
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ClusterError>(),
            Some(ClusterError::Api { code: 500, .. })
        ));
        assert_eq!(1, attempts.load(Ordering::SeqCst));
    }
}
