use std::future::Future;
use std::time::Duration;

use pvc_bench_core::prelude::{DelegatedShutdownListener, WaitTimeoutError};
use pvc_bench_kube::prelude::{ClusterApi, ClusterError};
use tokio::time::Instant;

/// How often the lifecycle waits check their condition.
pub const WAIT_INTERVAL: Duration = Duration::from_secs(1);

/// How long the lifecycle waits allow for their condition to be met.
pub const WAIT_DEADLINE: Duration = Duration::from_secs(10 * 60);

/// Check `condition` immediately and then once per `interval` until it returns true.
///
/// Fails with [WaitTimeoutError] once `deadline` has elapsed, with the condition's own error if it
/// fails, or with a shutdown error if the run is cancelled while waiting.
pub async fn poll_until<F, Fut>(
    what: &str,
    interval: Duration,
    deadline: Duration,
    shutdown_listener: &mut DelegatedShutdownListener,
    mut condition: F,
) -> anyhow::Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<bool>>,
{
    let started = Instant::now();
    loop {
        shutdown_listener.check()?;
        if condition().await? {
            return Ok(());
        }

        let elapsed = started.elapsed();
        if elapsed >= deadline {
            return Err(WaitTimeoutError::new(what, deadline).into());
        }

        log::trace!("Still waiting for {what} after {elapsed:?}");
        shutdown_listener.sleep(interval.min(deadline - elapsed)).await?;
    }
}

/// Wait until every desired replica of the stateful set reports ready.
pub async fn wait_for_stateful_set_ready(
    cluster: &dyn ClusterApi,
    namespace: &str,
    name: &str,
    shutdown_listener: &mut DelegatedShutdownListener,
) -> anyhow::Result<()> {
    let what = format!("statefulset {namespace}/{name} to be ready");
    poll_until(
        &what,
        WAIT_INTERVAL,
        WAIT_DEADLINE,
        shutdown_listener,
        move || async move {
            let stateful_set = cluster.get_stateful_set(namespace, name).await?;
            let desired = stateful_set
                .spec
                .as_ref()
                .and_then(|spec| spec.replicas)
                .unwrap_or(1);
            let ready = stateful_set
                .status
                .as_ref()
                .and_then(|status| status.ready_replicas)
                .unwrap_or(0);
            log::debug!("Statefulset {name} has {ready}/{desired} replicas ready");
            Ok(ready == desired)
        },
    )
    .await
}

/// Wait until the stateful set no longer exists.
pub async fn wait_for_stateful_set_deleted(
    cluster: &dyn ClusterApi,
    namespace: &str,
    name: &str,
    shutdown_listener: &mut DelegatedShutdownListener,
) -> anyhow::Result<()> {
    let what = format!("statefulset {namespace}/{name} to be deleted");
    poll_until(
        &what,
        WAIT_INTERVAL,
        WAIT_DEADLINE,
        shutdown_listener,
        move || async move { gone(cluster.get_stateful_set(namespace, name).await) },
    )
    .await
}

/// Wait until the namespace no longer exists.
pub async fn wait_for_namespace_deleted(
    cluster: &dyn ClusterApi,
    name: &str,
    shutdown_listener: &mut DelegatedShutdownListener,
) -> anyhow::Result<()> {
    let what = format!("namespace {name} to be deleted");
    poll_until(
        &what,
        WAIT_INTERVAL,
        WAIT_DEADLINE,
        shutdown_listener,
        move || async move { gone(cluster.get_namespace(name).await) },
    )
    .await
}

fn gone<T>(lookup: Result<T, ClusterError>) -> anyhow::Result<bool> {
    match lookup {
        Ok(_) => Ok(false),
        Err(e) if e.is_not_found() => Ok(true),
        Err(e) => Err(e.into()),
    }
}
