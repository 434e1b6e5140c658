use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pvc_bench_core::prelude::{ShutdownHandle, ShutdownReason, ShutdownSignalError};
use pvc_bench_instruments::{BenchMetrics, RunLabels};
use pvc_bench_kube::prelude::{ClusterError, FakeCluster};
use pvc_delete::config::ConfigError;
use pvc_delete::poller::{DeletionPoller, DEFAULT_POLL_INTERVAL, NS_GROUP};

const INTERVAL: Duration = Duration::from_millis(20);

fn labels() -> RunLabels {
    RunLabels::new("burst", "100Mi", 3)
}

fn names(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("data-sts-{i}")).collect()
}

#[tokio::test]
async fn claims_already_gone_are_done_in_one_sweep() {
    let cluster = FakeCluster::new();
    let metrics = Arc::new(BenchMetrics::new());
    let labels = labels();
    let mut listener = ShutdownHandle::new().new_listener();

    let most_terminating = Arc::new(AtomicI64::new(0));
    {
        let metrics = metrics.clone();
        let seen = most_terminating.clone();
        cluster.set_claim_lookup(move |name, _| {
            seen.fetch_max(metrics.snapshot().pvcs_terminating, Ordering::SeqCst);
            Err(FakeCluster::not_found(name))
        });
    }

    let poller = DeletionPoller::new(&cluster, "ns", INTERVAL, &metrics, &labels);
    let sample = poller.poll(&names(3), &mut listener).await.unwrap();

    assert_eq!(3, sample.len());
    assert!(sample.as_slice().iter().all(|latency| latency.is_zero()));
    assert_eq!(3, cluster.total_claim_lookups());
    assert_eq!(0, most_terminating.load(Ordering::SeqCst));

    let snapshot = metrics.snapshot();
    assert_eq!(0, snapshot.pvcs_terminating);
    let histogram = snapshot
        .delete_latency
        .get(&(labels.clone(), NS_GROUP.to_string()))
        .expect("latencies should be observed");
    assert_eq!(3, histogram.count);
}

#[tokio::test]
async fn terminating_claim_is_measured_from_its_deletion_timestamp() {
    let cluster = FakeCluster::new();
    let metrics = Arc::new(BenchMetrics::new());
    let labels = labels();
    let mut listener = ShutdownHandle::new().new_listener();

    let terminating_while_polling = Arc::new(AtomicI64::new(-1));
    {
        let metrics = metrics.clone();
        let seen = terminating_while_polling.clone();
        cluster.set_claim_lookup(move |name, previous| {
            if previous == 0 {
                Ok(FakeCluster::terminating_claim(name, Utc::now()))
            } else {
                seen.store(metrics.snapshot().pvcs_terminating, Ordering::SeqCst);
                Err(FakeCluster::not_found(name))
            }
        });
    }

    let poller = DeletionPoller::new(&cluster, "ns", INTERVAL, &metrics, &labels);
    let sample = poller.poll(&names(1), &mut listener).await.unwrap();

    assert_eq!(1, terminating_while_polling.load(Ordering::SeqCst));
    assert_eq!(1, sample.len());
    assert!(
        sample.as_slice()[0] >= Duration::from_millis(15),
        "latency {:?} should cover at least one poll interval",
        sample.as_slice()[0]
    );
    assert_eq!(2, cluster.total_claim_lookups());
    assert_eq!(0, metrics.snapshot().pvcs_terminating);
}

#[tokio::test]
async fn deleted_claims_are_not_looked_up_again() {
    let cluster = FakeCluster::new();
    let metrics = BenchMetrics::new();
    let labels = labels();
    let mut listener = ShutdownHandle::new().new_listener();

    // The first claim goes immediately, the second stays for three lookups.
    cluster.set_claim_lookup(|name, previous| {
        if name == "data-sts-1" && previous < 3 {
            Ok(FakeCluster::bound_claim(name))
        } else {
            Err(FakeCluster::not_found(name))
        }
    });

    let poller = DeletionPoller::new(&cluster, "ns", INTERVAL, &metrics, &labels);
    let sample = poller.poll(&names(2), &mut listener).await.unwrap();

    assert_eq!(2, sample.len());
    let counts = cluster.claim_lookup_counts();
    assert_eq!(Some(&1), counts.get("data-sts-0"));
    assert_eq!(Some(&4), counts.get("data-sts-1"));
}

#[tokio::test]
async fn lookup_failure_aborts_without_a_sample() {
    let cluster = FakeCluster::new();
    let metrics = BenchMetrics::new();
    let labels = labels();
    let mut listener = ShutdownHandle::new().new_listener();

    cluster.set_claim_lookup(|name, previous| {
        if previous == 0 {
            Ok(FakeCluster::terminating_claim(name, Utc::now()))
        } else {
            Err(ClusterError::Api {
                kind: "persistentvolumeclaim",
                name: name.to_string(),
                code: 500,
                message: "etcd unavailable".to_string(),
            })
        }
    });

    let poller = DeletionPoller::new(&cluster, "ns", INTERVAL, &metrics, &labels);
    let err = poller.poll(&names(2), &mut listener).await.unwrap_err();

    let cluster_error = err
        .downcast_ref::<ClusterError>()
        .expect("expected the cluster error to be returned");
    assert!(matches!(cluster_error, ClusterError::Api { code: 500, .. }));
    assert_eq!(0, metrics.snapshot().pvcs_terminating);
    assert!(metrics.snapshot().delete_latency.is_empty());
}

#[tokio::test]
async fn empty_claim_set_is_rejected_without_lookups() {
    let cluster = FakeCluster::new();
    let metrics = BenchMetrics::new();
    let labels = labels();
    let mut listener = ShutdownHandle::new().new_listener();

    let poller = DeletionPoller::new(&cluster, "ns", INTERVAL, &metrics, &labels);
    let err = poller.poll(&[], &mut listener).await.unwrap_err();

    assert_eq!(
        Some(&ConfigError::NoClaimsToTrack),
        err.downcast_ref::<ConfigError>()
    );
    assert_eq!(0, cluster.total_claim_lookups());
}

#[tokio::test]
async fn zero_interval_uses_default() {
    let cluster = FakeCluster::new();
    let metrics = BenchMetrics::new();
    let labels = labels();

    let poller = DeletionPoller::new(&cluster, "ns", Duration::ZERO, &metrics, &labels);
    assert_eq!(DEFAULT_POLL_INTERVAL, poller.interval());
}

#[tokio::test]
async fn shutdown_stops_polling() {
    let cluster = FakeCluster::new();
    let metrics = BenchMetrics::new();
    let labels = labels();
    let handle = ShutdownHandle::new();
    let mut listener = handle.new_listener();

    cluster.set_claim_lookup(|name, _| Ok(FakeCluster::terminating_claim(name, Utc::now())));

    let claim_names = names(2);
    let poller = DeletionPoller::new(&cluster, "ns", INTERVAL, &metrics, &labels);
    let (result, _) = tokio::join!(poller.poll(&claim_names, &mut listener), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.shutdown(ShutdownReason::DeadlineExceeded);
    });

    let err = result.unwrap_err();
    let shutdown = err
        .downcast_ref::<ShutdownSignalError>()
        .expect("expected a shutdown error");
    assert_eq!(ShutdownReason::DeadlineExceeded, shutdown.reason());
    assert_eq!(0, metrics.snapshot().pvcs_terminating);
}

#[tokio::test]
async fn shutdown_before_polling_makes_no_lookups() {
    let cluster = FakeCluster::new();
    let metrics = BenchMetrics::new();
    let labels = labels();
    let handle = ShutdownHandle::new();
    handle.shutdown(ShutdownReason::Interrupted);
    let mut listener = handle.new_listener();

    let poller = DeletionPoller::new(&cluster, "ns", INTERVAL, &metrics, &labels);
    let err = poller.poll(&names(2), &mut listener).await.unwrap_err();

    assert!(err.is::<ShutdownSignalError>());
    assert_eq!(0, cluster.total_claim_lookups());
}
