use std::collections::BTreeMap;

use anyhow::Context;
use k8s_openapi::api::apps::v1::{
    StatefulSet, StatefulSetPersistentVolumeClaimRetentionPolicy, StatefulSetSpec,
};
use k8s_openapi::api::core::v1::{
    Container, Namespace, PersistentVolumeClaim, PersistentVolumeClaimSpec, PodSpec,
    PodTemplateSpec, VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use pvc_bench_core::prelude::DelegatedShutdownListener;
use pvc_bench_kube::prelude::{ClusterApi, ClusterError};

use crate::config::RunConfig;
use crate::retry::{retry_on_conflict, RetryPolicy};
use crate::wait::wait_for_namespace_deleted;

/// The name of the volume claim template, which prefixes every claim name.
pub const CLAIM_TEMPLATE_NAME: &str = "data";

const PAUSE_IMAGE: &str = "registry.k8s.io/pause:3.9";
const DATA_MOUNT_PATH: &str = "/mnt/data";
const RETAIN_DELETE: &str = "Delete";

/// Create the namespace unless it already exists.
pub async fn ensure_namespace(cluster: &dyn ClusterApi, name: &str) -> anyhow::Result<()> {
    match cluster.get_namespace(name).await {
        Ok(_) => return Ok(()),
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(e.into()),
    }

    let namespace = Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        ..Default::default()
    };

    match cluster.create_namespace(&namespace).await {
        Ok(_) => {
            log::info!("Created namespace {name}");
            Ok(())
        }
        // Somebody else created it between our lookup and create.
        Err(e) if e.is_already_exists() => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to create namespace {name}")),
    }
}

/// Request deletion of the namespace. A namespace that does not exist is not an error.
pub async fn delete_namespace(cluster: &dyn ClusterApi, name: &str) -> anyhow::Result<()> {
    ignore_not_found(cluster.delete_namespace(name).await)
        .with_context(|| format!("Failed to delete namespace {name}"))
}

/// Request deletion of the stateful set. A stateful set that does not exist is not an error.
pub async fn delete_stateful_set(
    cluster: &dyn ClusterApi,
    namespace: &str,
    name: &str,
) -> anyhow::Result<()> {
    ignore_not_found(cluster.delete_stateful_set(namespace, name).await)
        .with_context(|| format!("Failed to delete statefulset {namespace}/{name}"))
}

/// Remove the finalizers from every claim in the namespace that has any and from the namespace
/// itself, then wait for the namespace to go away.
pub async fn force_delete_namespace(
    cluster: &dyn ClusterApi,
    name: &str,
    shutdown_listener: &mut DelegatedShutdownListener,
) -> anyhow::Result<()> {
    let claims = match cluster.list_persistent_volume_claims(name, None).await {
        Ok(claims) => claims,
        Err(e) if e.is_not_found() => Vec::new(),
        Err(e) => return Err(e.into()),
    };

    for claim in claims {
        if claim.metadata.finalizers.as_ref().map_or(true, Vec::is_empty) {
            continue;
        }

        let claim_name = claim.metadata.name.unwrap_or_default();
        if let Err(e) = ignore_not_found(
            cluster
                .clear_persistent_volume_claim_finalizers(name, &claim_name)
                .await,
        ) {
            log::error!("Failed to remove finalizers from claim {claim_name}: {e}");
            return Err(e.into());
        }
    }

    ignore_not_found(cluster.clear_namespace_finalizers(name).await)?;

    wait_for_namespace_deleted(cluster, name, shutdown_listener).await
}

/// Build the stateful set for a run.
///
/// Pods start in parallel and each gets one claim from the `data` template. Claims are deleted
/// when the set is scaled down or deleted, which is what makes deletion observable at all.
pub fn build_stateful_set(config: &RunConfig) -> anyhow::Result<StatefulSet> {
    let replicas = i32::try_from(config.replicas())
        .with_context(|| format!("Too many replicas: {}", config.replicas()))?;
    let labels = BTreeMap::from([("app".to_string(), config.name().to_string())]);

    Ok(StatefulSet {
        metadata: ObjectMeta {
            name: Some(config.name().to_string()),
            namespace: Some(config.namespace().to_string()),
            ..Default::default()
        },
        spec: Some(StatefulSetSpec {
            replicas: Some(replicas),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            pod_management_policy: Some("Parallel".to_string()),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels.clone()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: "pause".to_string(),
                        image: Some(PAUSE_IMAGE.to_string()),
                        volume_mounts: Some(vec![VolumeMount {
                            name: CLAIM_TEMPLATE_NAME.to_string(),
                            mount_path: DATA_MOUNT_PATH.to_string(),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            volume_claim_templates: Some(vec![PersistentVolumeClaim {
                metadata: ObjectMeta {
                    name: Some(CLAIM_TEMPLATE_NAME.to_string()),
                    labels: Some(labels),
                    ..Default::default()
                },
                spec: Some(PersistentVolumeClaimSpec {
                    access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                    resources: Some(VolumeResourceRequirements {
                        requests: Some(BTreeMap::from([(
                            "storage".to_string(),
                            Quantity(config.pvc_size().to_string()),
                        )])),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            persistent_volume_claim_retention_policy: Some(
                StatefulSetPersistentVolumeClaimRetentionPolicy {
                    when_scaled: Some(RETAIN_DELETE.to_string()),
                    when_deleted: Some(RETAIN_DELETE.to_string()),
                },
            ),
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Create the stateful set for a run.
pub async fn create_stateful_set(
    cluster: &dyn ClusterApi,
    config: &RunConfig,
) -> anyhow::Result<StatefulSet> {
    let stateful_set = build_stateful_set(config)?;
    let created = cluster
        .create_stateful_set(config.namespace(), &stateful_set)
        .await
        .with_context(|| {
            format!(
                "Failed to create statefulset {}/{}",
                config.namespace(),
                config.name()
            )
        })?;

    log::info!(
        "Created statefulset {}/{} with {} replicas",
        config.namespace(),
        config.name(),
        config.replicas()
    );
    Ok(created)
}

/// Set the desired replica count, re-reading and retrying if the update conflicts with another
/// writer.
pub async fn scale_stateful_set(
    cluster: &dyn ClusterApi,
    namespace: &str,
    name: &str,
    replicas: u32,
    retry_policy: &RetryPolicy,
    shutdown_listener: &mut DelegatedShutdownListener,
) -> anyhow::Result<()> {
    let replicas =
        i32::try_from(replicas).with_context(|| format!("Too many replicas: {replicas}"))?;

    retry_on_conflict(retry_policy, shutdown_listener, move || async move {
        let mut stateful_set = cluster.get_stateful_set(namespace, name).await?;
        stateful_set
            .spec
            .get_or_insert_with(Default::default)
            .replicas = Some(replicas);
        cluster.replace_stateful_set(namespace, &stateful_set).await
    })
    .await?;

    Ok(())
}

/// The names of the claims in the namespace that match the label selector.
pub async fn list_claim_names(
    cluster: &dyn ClusterApi,
    namespace: &str,
    label_selector: &str,
) -> anyhow::Result<Vec<String>> {
    let claims = cluster
        .list_persistent_volume_claims(namespace, Some(label_selector))
        .await?;

    Ok(claims
        .into_iter()
        .filter_map(|claim| claim.metadata.name)
        .collect())
}

fn ignore_not_found(result: Result<(), ClusterError>) -> Result<(), ClusterError> {
    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}
