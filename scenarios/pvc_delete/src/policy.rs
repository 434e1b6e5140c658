use std::time::Duration;

use pvc_bench_core::prelude::DelegatedShutdownListener;
use pvc_bench_instruments::BenchMetrics;
use pvc_bench_kube::prelude::ClusterApi;

use crate::config::ScenarioKind;
use crate::lifecycle::scale_stateful_set;
use crate::retry::RetryPolicy;

/// How the desired replica count is reduced to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDownPolicy {
    /// Scale straight to zero.
    Burst,
    /// Remove `batch_size` replicas at a time, waiting `interval` between steps.
    Staggered { batch_size: u32, interval: Duration },
}

impl From<ScenarioKind> for ScaleDownPolicy {
    fn from(kind: ScenarioKind) -> Self {
        match kind {
            ScenarioKind::Burst => ScaleDownPolicy::Burst,
            ScenarioKind::Staggered {
                batch_size,
                interval,
            } => ScaleDownPolicy::Staggered {
                batch_size,
                interval,
            },
        }
    }
}

impl ScaleDownPolicy {
    /// The replica counts to apply, in order, starting from `replicas`. Always ends with zero.
    pub fn targets(&self, replicas: u32) -> Vec<u32> {
        match self {
            ScaleDownPolicy::Burst => vec![0],
            ScaleDownPolicy::Staggered { batch_size, .. } => {
                // A zero batch would never reach zero, treat it as a single step.
                let batch_size = (*batch_size).max(1);
                let mut targets = Vec::new();
                let mut current = replicas;
                loop {
                    current = current.saturating_sub(batch_size);
                    targets.push(current);
                    if current == 0 {
                        break;
                    }
                }
                targets
            }
        }
    }

    fn interval(&self) -> Duration {
        match self {
            ScaleDownPolicy::Burst => Duration::ZERO,
            ScaleDownPolicy::Staggered { interval, .. } => *interval,
        }
    }

    /// Apply each target in turn, sleeping between steps but not after the last one. The pods
    /// remaining gauge follows each applied target.
    #[allow(clippy::too_many_arguments)]
    pub async fn apply(
        &self,
        cluster: &dyn ClusterApi,
        namespace: &str,
        name: &str,
        replicas: u32,
        retry_policy: &RetryPolicy,
        metrics: &BenchMetrics,
        shutdown_listener: &mut DelegatedShutdownListener,
    ) -> anyhow::Result<()> {
        let targets = self.targets(replicas);
        let last = targets.len() - 1;

        for (step, target) in targets.into_iter().enumerate() {
            log::info!("Scaling {namespace}/{name} down to {target} replicas");
            scale_stateful_set(
                cluster,
                namespace,
                name,
                target,
                retry_policy,
                shutdown_listener,
            )
            .await?;
            metrics.set_pods_remaining(target);

            if step < last {
                shutdown_listener.sleep(self.interval()).await?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staggered(batch_size: u32) -> ScaleDownPolicy {
        ScaleDownPolicy::Staggered {
            batch_size,
            interval: Duration::from_secs(5),
        }
    }

    #[test]
    fn burst_is_a_single_step_to_zero() {
        assert_eq!(vec![0], ScaleDownPolicy::Burst.targets(100));
    }

    #[test]
    fn staggered_final_batch_may_be_smaller() {
        assert_eq!(vec![7, 4, 1, 0], staggered(3).targets(10));
    }

    #[test]
    fn staggered_full_batch_is_a_single_step() {
        assert_eq!(vec![0], staggered(5).targets(5));
    }

    #[test]
    fn staggered_even_batches() {
        assert_eq!(vec![3, 2, 1, 0], staggered(1).targets(4));
        assert_eq!(vec![4, 2, 0], staggered(2).targets(6));
    }

    #[test]
    fn targets_are_non_increasing_and_end_at_zero() {
        for replicas in 1..30 {
            for batch_size in 1..=replicas {
                let targets = staggered(batch_size).targets(replicas);
                assert_eq!(Some(&0), targets.last());
                assert!(targets.windows(2).all(|w| w[0] > w[1]), "{targets:?}");
                assert!(targets[0] < replicas);
            }
        }
    }
}
