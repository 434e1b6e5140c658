use std::fmt::{Display, Formatter};
use std::future::Future;
use std::time::Duration;

use pvc_bench_core::prelude::DelegatedShutdownListener;
use pvc_bench_instruments::{BenchMetrics, LatencySample, RunLabels};
use pvc_bench_kube::prelude::ClusterApi;
use tokio::time::Instant;

use crate::config::RunConfig;
use crate::lifecycle::{
    create_stateful_set, delete_stateful_set, ensure_namespace, list_claim_names,
};
use crate::poller::DeletionPoller;
use crate::policy::ScaleDownPolicy;
use crate::retry::RetryPolicy;
use crate::wait::{wait_for_stateful_set_deleted, wait_for_stateful_set_ready};

/// The steps of a run, used to tag the error counter when one fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    NamespaceCreation,
    StatefulSetGet,
    StatefulSetDelete,
    StatefulSetDeleteWait,
    StatefulSetCreation,
    StatefulSetReadyWait,
    PvcList,
    StatefulSetScale,
    PvcDeletePoll,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::NamespaceCreation => "namespace_creation",
            Stage::StatefulSetGet => "sts_get",
            Stage::StatefulSetDelete => "sts_delete",
            Stage::StatefulSetDeleteWait => "sts_delete_wait",
            Stage::StatefulSetCreation => "sts_creation",
            Stage::StatefulSetReadyWait => "sts_ready_wait",
            Stage::PvcList => "pvc_list",
            Stage::StatefulSetScale => "sts_scale",
            Stage::PvcDeletePoll => "pvc_delete_poll",
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    /// From just before the first scale request until every claim was seen deleted.
    pub duration: Duration,
    pub latencies: LatencySample,
}

/// Marks the run active for as long as it is alive. If the run does not complete, the progress
/// gauges are reset when it is dropped, which also covers the run being cancelled.
struct ActiveRun<'a> {
    metrics: &'a BenchMetrics,
    labels: &'a RunLabels,
    completed: bool,
}

impl<'a> ActiveRun<'a> {
    fn start(metrics: &'a BenchMetrics, labels: &'a RunLabels) -> Self {
        metrics.set_run_active(labels, true);
        Self {
            metrics,
            labels,
            completed: false,
        }
    }
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        self.metrics.set_run_active(self.labels, false);
        if !self.completed {
            self.metrics.reset_progress();
        }
    }
}

/// Run the configured scenario against the cluster, using the default conflict retry policy.
pub async fn run_scenario(
    cluster: &dyn ClusterApi,
    config: &RunConfig,
    metrics: &BenchMetrics,
    shutdown_listener: &mut DelegatedShutdownListener,
) -> anyhow::Result<RunResult> {
    run_scenario_with_retry(
        cluster,
        config,
        metrics,
        &RetryPolicy::default(),
        shutdown_listener,
    )
    .await
}

/// Create the stateful set, wait for it to be ready, scale it down according to the scenario and
/// measure how long each of its claims takes to be deleted.
///
/// Any failure aborts the run. The error is returned as is after counting it against the stage
/// that failed.
pub async fn run_scenario_with_retry(
    cluster: &dyn ClusterApi,
    config: &RunConfig,
    metrics: &BenchMetrics,
    retry_policy: &RetryPolicy,
    shutdown_listener: &mut DelegatedShutdownListener,
) -> anyhow::Result<RunResult> {
    let scenario = config.scenario().name();
    let namespace = config.namespace();
    let name = config.name();
    let labels = RunLabels::new(scenario.as_str(), config.pvc_size(), config.replicas());
    let mut active_run = ActiveRun::start(metrics, &labels);

    log::info!("Starting {scenario} scenario in namespace {namespace}");

    stage(metrics, Stage::NamespaceCreation, async {
        ensure_namespace(cluster, namespace).await
    })
    .await?;

    let existing = stage(metrics, Stage::StatefulSetGet, async {
        match cluster.get_stateful_set(namespace, name).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.into()),
        }
    })
    .await?;
    if existing {
        log::info!("Removing statefulset {namespace}/{name} left over from an earlier run");
        stage(metrics, Stage::StatefulSetDelete, async {
            delete_stateful_set(cluster, namespace, name).await
        })
        .await?;
        stage(metrics, Stage::StatefulSetDeleteWait, async {
            wait_for_stateful_set_deleted(cluster, namespace, name, shutdown_listener).await
        })
        .await?;
    }

    stage(metrics, Stage::StatefulSetCreation, async {
        create_stateful_set(cluster, config).await
    })
    .await?;

    log::info!("Waiting for pods of {namespace}/{name} to be ready");
    stage(metrics, Stage::StatefulSetReadyWait, async {
        wait_for_stateful_set_ready(cluster, namespace, name, shutdown_listener).await
    })
    .await?;

    let claim_names = stage(metrics, Stage::PvcList, async {
        list_claim_names(cluster, namespace, &config.label_selector()).await
    })
    .await?;
    log::info!("Tracking {} claims for deletion", claim_names.len());

    let policy = ScaleDownPolicy::from(config.scenario());
    metrics.set_pods_remaining(config.replicas());
    let start = Instant::now();
    stage(metrics, Stage::StatefulSetScale, async {
        policy
            .apply(
                cluster,
                namespace,
                name,
                config.replicas(),
                retry_policy,
                metrics,
                shutdown_listener,
            )
            .await
    })
    .await?;

    let poller = DeletionPoller::new(
        cluster,
        namespace,
        config.pvc_poll_interval(),
        metrics,
        &labels,
    );
    let latencies = stage(metrics, Stage::PvcDeletePoll, async {
        poller.poll(&claim_names, shutdown_listener).await
    })
    .await?;

    let duration = start.elapsed();
    metrics.set_pods_remaining(0);
    metrics.set_total_duration(&labels, duration);
    active_run.completed = true;

    log::info!("{scenario} scenario completed in {duration:?}");

    Ok(RunResult {
        duration,
        latencies,
    })
}

async fn stage<T>(
    metrics: &BenchMetrics,
    stage: Stage,
    fut: impl Future<Output = anyhow::Result<T>>,
) -> anyhow::Result<T> {
    match fut.await {
        Ok(value) => Ok(value),
        Err(e) => {
            log::error!("Stage {stage} failed: {e:?}");
            metrics.inc_error(stage.as_str());
            Err(e)
        }
    }
}
