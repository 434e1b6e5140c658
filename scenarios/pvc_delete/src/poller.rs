use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pvc_bench_core::prelude::{DelegatedShutdownListener, ShutdownSignalError};
use pvc_bench_instruments::{BenchMetrics, LatencySample, RunLabels};
use pvc_bench_kube::prelude::{ClusterApi, PersistentVolumeClaim};
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::ConfigError;

/// Used when the configured poll interval is zero.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// The namespace group tag on latency observations. Every run uses a single namespace.
pub const NS_GROUP: &str = "single";

/// What the poller has observed about one claim. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimState {
    /// The claim exists and has not been seen with a deletion timestamp.
    Unseen,
    /// The claim has been seen marked for deletion.
    Terminating { since: DateTime<Utc> },
    /// A lookup found the claim gone.
    Deleted { latency: Duration },
}

#[derive(Debug)]
struct TrackedClaim {
    name: String,
    state: ClaimState,
}

/// Claim states kept in insertion order, with an index by name.
#[derive(Debug)]
pub struct ClaimTracker {
    claims: Vec<TrackedClaim>,
    index: HashMap<String, usize>,
}

impl ClaimTracker {
    pub fn new(names: &[String]) -> Self {
        let mut claims = Vec::with_capacity(names.len());
        let mut index = HashMap::with_capacity(names.len());
        for name in names {
            if index.contains_key(name) {
                continue;
            }
            index.insert(name.clone(), claims.len());
            claims.push(TrackedClaim {
                name: name.clone(),
                state: ClaimState::Unseen,
            });
        }

        Self { claims, index }
    }

    pub fn state(&self, name: &str) -> Option<ClaimState> {
        self.index.get(name).map(|idx| self.claims[*idx].state)
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    /// Positions of the claims that have not been seen deleted yet.
    fn pending(&self) -> Vec<usize> {
        self.claims
            .iter()
            .enumerate()
            .filter(|(_, claim)| !matches!(claim.state, ClaimState::Deleted { .. }))
            .map(|(idx, _)| idx)
            .collect()
    }

    fn all_deleted(&self) -> bool {
        self.claims
            .iter()
            .all(|claim| matches!(claim.state, ClaimState::Deleted { .. }))
    }

    /// Record that the claim exists. Returns true the first time it is seen terminating.
    ///
    /// A deletion timestamp at or before the Unix epoch is treated as unset and replaced by `now`.
    fn observe_present(
        &mut self,
        idx: usize,
        deletion_timestamp: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        let claim = &mut self.claims[idx];
        match (claim.state, deletion_timestamp) {
            (ClaimState::Unseen, Some(marked)) => {
                let since = if marked.timestamp() <= 0 { now } else { marked };
                claim.state = ClaimState::Terminating { since };
                true
            }
            _ => false,
        }
    }

    /// Record that the claim is gone. Returns the latency and whether it had been seen terminating.
    ///
    /// A claim that was never seen terminating is measured from `now`, so its latency is zero.
    fn observe_absent(&mut self, idx: usize, now: DateTime<Utc>) -> (Duration, bool) {
        let claim = &mut self.claims[idx];
        let (since, was_terminating) = match claim.state {
            ClaimState::Terminating { since } => (since, true),
            _ => (now, false),
        };

        let latency = (now - since).to_std().unwrap_or(Duration::ZERO);
        claim.state = ClaimState::Deleted { latency };
        (latency, was_terminating)
    }

    fn into_sample(self) -> LatencySample {
        self.claims
            .into_iter()
            .filter_map(|claim| match claim.state {
                ClaimState::Deleted { latency } => Some(latency),
                _ => None,
            })
            .collect::<Vec<_>>()
            .into()
    }
}

/// Looks up each tracked claim on a fixed interval until every one of them is gone.
pub struct DeletionPoller<'a> {
    cluster: &'a dyn ClusterApi,
    namespace: &'a str,
    interval: Duration,
    metrics: &'a BenchMetrics,
    labels: &'a RunLabels,
}

impl<'a> DeletionPoller<'a> {
    pub fn new(
        cluster: &'a dyn ClusterApi,
        namespace: &'a str,
        interval: Duration,
        metrics: &'a BenchMetrics,
        labels: &'a RunLabels,
    ) -> Self {
        let interval = if interval.is_zero() {
            DEFAULT_POLL_INTERVAL
        } else {
            interval
        };

        Self {
            cluster,
            namespace,
            interval,
            metrics,
            labels,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Poll until every named claim has been seen deleted and return their latencies.
    ///
    /// Any lookup error other than not found aborts the whole poll. On any failure, including
    /// shutdown, the terminating gauge is reset and no sample is returned.
    pub async fn poll(
        &self,
        names: &[String],
        shutdown_listener: &mut DelegatedShutdownListener,
    ) -> anyhow::Result<LatencySample> {
        if names.is_empty() {
            return Err(ConfigError::NoClaimsToTrack.into());
        }

        let result = self.poll_inner(ClaimTracker::new(names), shutdown_listener).await;
        if result.is_err() {
            self.metrics.reset_terminating();
        }

        result
    }

    async fn poll_inner(
        &self,
        mut tracker: ClaimTracker,
        shutdown_listener: &mut DelegatedShutdownListener,
    ) -> anyhow::Result<LatencySample> {
        log::debug!(
            "Polling {} claims in {} every {:?}",
            tracker.len(),
            self.namespace,
            self.interval
        );

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            shutdown_listener.check()?;

            for idx in tracker.pending() {
                let name = tracker.claims[idx].name.clone();
                match self.cluster.get_persistent_volume_claim(self.namespace, &name).await {
                    Ok(claim) => {
                        let marked = deletion_timestamp(&claim);
                        if tracker.observe_present(idx, marked, Utc::now()) {
                            log::trace!("Claim {name} is terminating");
                            self.metrics.inc_terminating();
                        }
                    }
                    Err(e) if e.is_not_found() => {
                        let (latency, was_terminating) = tracker.observe_absent(idx, Utc::now());
                        log::trace!("Claim {name} deleted after {latency:?}");
                        self.metrics
                            .observe_delete_latency(self.labels, NS_GROUP, latency);
                        if was_terminating {
                            self.metrics.dec_terminating();
                        }
                    }
                    Err(e) => {
                        log::error!("Failed to look up claim {name}: {e}");
                        return Err(e.into());
                    }
                }
            }

            if tracker.all_deleted() {
                return Ok(tracker.into_sample());
            }

            tokio::select! {
                _ = ticker.tick() => {}
                reason = shutdown_listener.wait_for_shutdown() => {
                    return Err(ShutdownSignalError::new(reason).into());
                }
            }
        }
    }
}

fn deletion_timestamp(claim: &PersistentVolumeClaim) -> Option<DateTime<Utc>> {
    claim.metadata.deletion_timestamp.as_ref().map(|time| time.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn tracker_ignores_duplicate_names() {
        let tracker = ClaimTracker::new(&names(&["a", "b", "a"]));
        assert_eq!(2, tracker.len());
        assert_eq!(Some(ClaimState::Unseen), tracker.state("a"));
        assert_eq!(None, tracker.state("c"));
    }

    #[test]
    fn terminating_is_entered_once() {
        let mut tracker = ClaimTracker::new(&names(&["a"]));
        let marked = Utc::now() - TimeDelta::seconds(3);
        let now = Utc::now();

        assert!(!tracker.observe_present(0, None, now));
        assert!(tracker.observe_present(0, Some(marked), now));
        assert!(!tracker.observe_present(0, Some(now), now));
        assert_eq!(
            Some(ClaimState::Terminating { since: marked }),
            tracker.state("a")
        );
    }

    #[test]
    fn epoch_deletion_timestamp_falls_back_to_now() {
        let mut tracker = ClaimTracker::new(&names(&["a"]));
        let now = Utc::now();

        assert!(tracker.observe_present(0, Some(DateTime::<Utc>::UNIX_EPOCH), now));
        assert_eq!(Some(ClaimState::Terminating { since: now }), tracker.state("a"));
    }

    #[test]
    fn latency_is_measured_from_deletion_timestamp() {
        let mut tracker = ClaimTracker::new(&names(&["a"]));
        let marked = Utc::now();
        tracker.observe_present(0, Some(marked), marked);

        let (latency, was_terminating) =
            tracker.observe_absent(0, marked + TimeDelta::milliseconds(1500));
        assert!(was_terminating);
        assert_eq!(Duration::from_millis(1500), latency);
        assert!(tracker.all_deleted());
    }

    #[test]
    fn never_seen_terminating_has_zero_latency() {
        let mut tracker = ClaimTracker::new(&names(&["a"]));

        let (latency, was_terminating) = tracker.observe_absent(0, Utc::now());
        assert!(!was_terminating);
        assert_eq!(Duration::ZERO, latency);
    }

    #[test]
    fn future_deletion_timestamp_clamps_to_zero() {
        let mut tracker = ClaimTracker::new(&names(&["a"]));
        let now = Utc::now();
        tracker.observe_present(0, Some(now + TimeDelta::seconds(10)), now);

        let (latency, _) = tracker.observe_absent(0, now);
        assert_eq!(Duration::ZERO, latency);
    }
}
