use pvc_bench_core::prelude::DelegatedShutdownListener;
use pvc_bench_kube::prelude::ClusterApi;

use crate::lifecycle::{delete_namespace, force_delete_namespace};
use crate::wait::wait_for_namespace_deleted;

/// Namespaces created by the benchmark all start with this prefix.
pub const NAMESPACE_PREFIX: &str = "pvcbench-";

/// Delete every benchmark namespace and wait for each to be gone before moving to the next.
///
/// With `force`, finalizers are removed from the namespace and its claims instead of waiting for
/// them to be processed. The first failure stops the cleanup. Returns the deleted namespaces.
pub async fn cleanup_namespaces(
    cluster: &dyn ClusterApi,
    force: bool,
    shutdown_listener: &mut DelegatedShutdownListener,
) -> anyhow::Result<Vec<String>> {
    let namespaces = cluster.list_namespaces().await?;

    let mut deleted = Vec::new();
    for name in namespaces
        .into_iter()
        .filter_map(|namespace| namespace.metadata.name)
        .filter(|name| name.starts_with(NAMESPACE_PREFIX))
    {
        log::info!("Deleting namespace {name}");
        if let Err(e) = delete_namespace(cluster, &name).await {
            log::error!("Failed to delete namespace {name}: {e:?}");
            return Err(e);
        }

        let waited = if force {
            force_delete_namespace(cluster, &name, shutdown_listener).await
        } else {
            wait_for_namespace_deleted(cluster, &name, shutdown_listener).await
        };
        if let Err(e) = waited {
            log::error!("Waiting for namespace {name} to be deleted failed: {e:?}");
            return Err(e);
        }

        deleted.push(name);
    }

    Ok(deleted)
}
