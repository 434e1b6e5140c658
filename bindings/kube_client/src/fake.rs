use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetStatus};
use k8s_openapi::api::core::v1::{
    Namespace, NamespaceStatus, PersistentVolumeClaim, PersistentVolumeClaimSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use parking_lot::Mutex;

use crate::api::ClusterApi;
use crate::error::{ClusterError, ClusterResult};

/// A call made against a [FakeCluster], recorded in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeCall {
    GetNamespace(String),
    ListNamespaces,
    CreateNamespace(String),
    DeleteNamespace(String),
    ClearNamespaceFinalizers(String),
    GetStatefulSet(String),
    CreateStatefulSet(String),
    ReplaceStatefulSet { name: String, replicas: i32 },
    DeleteStatefulSet(String),
    GetPersistentVolumeClaim(String),
    ListPersistentVolumeClaims(Option<String>),
    ClearPersistentVolumeClaimFinalizers(String),
    ServerVersion,
}

type ClaimLookup = Box<dyn FnMut(&str, usize) -> ClusterResult<PersistentVolumeClaim> + Send>;

#[derive(Default)]
struct FakeState {
    namespaces: BTreeMap<String, Namespace>,
    stateful_sets: BTreeMap<(String, String), StatefulSet>,
    claims: BTreeMap<(String, String), PersistentVolumeClaim>,
    calls: Vec<FakeCall>,
    claim_lookups: BTreeMap<String, usize>,
    conflicts_remaining: usize,
    failures: BTreeMap<&'static str, u16>,
    hold_namespace_deletion: bool,
    server_version: Option<String>,
}

/// In-memory [ClusterApi] for tests.
///
/// Objects are stored as given. Creating a stateful set also creates one claim per replica and
/// volume claim template, named `<template>-<set>-<ordinal>`, and scaling down removes the claims
/// above the new replica count. Stateful sets always report every replica as ready.
///
/// Claim lookups can be scripted with [FakeCluster::set_claim_lookup] to simulate claims that stay
/// terminating for a while.
#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<FakeState>,
    claim_lookup: Mutex<Option<ClaimLookup>>,
    resource_version: AtomicU64,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<FakeCall> {
        self.state.lock().calls.clone()
    }

    /// The replica counts written by stateful set replacements, in order.
    pub fn scale_history(&self) -> Vec<i32> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                FakeCall::ReplaceStatefulSet { replicas, .. } => Some(*replicas),
                _ => None,
            })
            .collect()
    }

    /// How many times each claim has been looked up by name.
    pub fn claim_lookup_counts(&self) -> BTreeMap<String, usize> {
        self.state.lock().claim_lookups.clone()
    }

    pub fn total_claim_lookups(&self) -> usize {
        self.state.lock().claim_lookups.values().sum()
    }

    /// Reject the next `count` stateful set replacements with a conflict.
    pub fn inject_conflicts(&self, count: usize) {
        self.state.lock().conflicts_remaining = count;
    }

    /// Fail every call to `operation` with the error the real client maps `code` to. Operation
    /// names match the [ClusterApi] method names.
    pub fn fail_with(&self, operation: &'static str, code: u16) {
        self.state.lock().failures.insert(operation, code);
    }

    /// Keep deleted namespaces around, marked for deletion, until their finalizers are cleared.
    pub fn hold_namespace_deletion(&self) {
        self.state.lock().hold_namespace_deletion = true;
    }

    pub fn set_server_version(&self, version: impl Into<String>) {
        self.state.lock().server_version = Some(version.into());
    }

    /// Replace claim lookups by name with `lookup`. It receives the claim name and the number of
    /// earlier lookups for that claim.
    pub fn set_claim_lookup<F>(&self, lookup: F)
    where
        F: FnMut(&str, usize) -> ClusterResult<PersistentVolumeClaim> + Send + 'static,
    {
        *self.claim_lookup.lock() = Some(Box::new(lookup));
    }

    /// Add a namespace directly, without recording a call.
    pub fn insert_namespace(&self, name: &str) {
        let namespace = self.active_namespace(name);
        self.state
            .lock()
            .namespaces
            .insert(name.to_string(), namespace);
    }

    pub fn namespace_names(&self) -> Vec<String> {
        self.state.lock().namespaces.keys().cloned().collect()
    }

    pub fn claim_names(&self, namespace: &str) -> Vec<String> {
        self.state
            .lock()
            .claims
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| name.clone())
            .collect()
    }

    pub fn stateful_set(&self, namespace: &str, name: &str) -> Option<StatefulSet> {
        self.state
            .lock()
            .stateful_sets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// A claim that is marked for deletion at `since`.
    pub fn terminating_claim(name: &str, since: DateTime<Utc>) -> PersistentVolumeClaim {
        PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                deletion_timestamp: Some(Time(since)),
                finalizers: Some(vec!["kubernetes.io/pvc-protection".to_string()]),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// A claim that is not marked for deletion.
    pub fn bound_claim(name: &str) -> PersistentVolumeClaim {
        PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn not_found(name: &str) -> ClusterError {
        ClusterError::NotFound {
            kind: "persistentvolumeclaim",
            name: name.to_string(),
        }
    }

    fn record(&self, state: &mut FakeState, call: FakeCall) {
        log::trace!("Fake cluster call: {call:?}");
        state.calls.push(call);
    }

    fn check_failure(
        state: &FakeState,
        operation: &'static str,
        kind: &'static str,
        name: &str,
    ) -> ClusterResult<()> {
        let name = name.to_string();
        match state.failures.get(operation).copied() {
            None => Ok(()),
            Some(404) => Err(ClusterError::NotFound { kind, name }),
            Some(409) if operation.starts_with("create_") => {
                Err(ClusterError::AlreadyExists { kind, name })
            }
            Some(409) => Err(ClusterError::Conflict { kind, name }),
            Some(code) => Err(ClusterError::Api {
                kind,
                name,
                code,
                message: format!("injected failure for {operation}"),
            }),
        }
    }

    fn next_resource_version(&self) -> String {
        (self.resource_version.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }

    fn active_namespace(&self, name: &str) -> Namespace {
        Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                resource_version: Some(self.next_resource_version()),
                ..Default::default()
            },
            status: Some(NamespaceStatus {
                phase: Some("Active".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn remove_namespace_contents(state: &mut FakeState, namespace: &str) {
        state.stateful_sets.retain(|(ns, _), _| ns != namespace);
        state.claims.retain(|(ns, _), _| ns != namespace);
    }
}

fn object_name(metadata: &ObjectMeta) -> String {
    metadata.name.clone().unwrap_or_default()
}

fn replicas_of(stateful_set: &StatefulSet) -> i32 {
    stateful_set
        .spec
        .as_ref()
        .and_then(|spec| spec.replicas)
        .unwrap_or(1)
}

/// The `(template, labels)` pairs of the claims created for each replica.
fn claim_templates(stateful_set: &StatefulSet) -> Vec<(String, BTreeMap<String, String>)> {
    stateful_set
        .spec
        .as_ref()
        .and_then(|spec| spec.volume_claim_templates.as_ref())
        .map(|templates| {
            templates
                .iter()
                .map(|template| {
                    (
                        object_name(&template.metadata),
                        template.metadata.labels.clone().unwrap_or_default(),
                    )
                })
                .collect()
        })
        .unwrap_or_default()
}

fn claim_name(template: &str, set_name: &str, ordinal: i32) -> String {
    format!("{template}-{set_name}-{ordinal}")
}

fn matches_selector(claim: &PersistentVolumeClaim, selector: Option<&str>) -> bool {
    let Some(selector) = selector else {
        return true;
    };
    let labels = claim.metadata.labels.clone().unwrap_or_default();

    selector
        .split(',')
        .filter(|term| !term.trim().is_empty())
        .all(|term| match term.split_once('=') {
            Some((key, value)) => labels.get(key.trim()).map(String::as_str) == Some(value.trim()),
            None => labels.contains_key(term.trim()),
        })
}

fn with_ready_status(mut stateful_set: StatefulSet) -> StatefulSet {
    let replicas = replicas_of(&stateful_set);
    stateful_set.status = Some(StatefulSetStatus {
        replicas,
        ready_replicas: Some(replicas),
        ..Default::default()
    });
    stateful_set
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn get_namespace(&self, name: &str) -> ClusterResult<Namespace> {
        let mut state = self.state.lock();
        self.record(&mut state, FakeCall::GetNamespace(name.to_string()));
        Self::check_failure(&state, "get_namespace", "namespace", name)?;

        state
            .namespaces
            .get(name)
            .cloned()
            .ok_or_else(|| ClusterError::NotFound {
                kind: "namespace",
                name: name.to_string(),
            })
    }

    async fn list_namespaces(&self) -> ClusterResult<Vec<Namespace>> {
        let mut state = self.state.lock();
        self.record(&mut state, FakeCall::ListNamespaces);
        Self::check_failure(&state, "list_namespaces", "namespace", "")?;

        Ok(state.namespaces.values().cloned().collect())
    }

    async fn create_namespace(&self, namespace: &Namespace) -> ClusterResult<Namespace> {
        let name = object_name(&namespace.metadata);
        let mut state = self.state.lock();
        self.record(&mut state, FakeCall::CreateNamespace(name.clone()));
        Self::check_failure(&state, "create_namespace", "namespace", &name)?;

        if state.namespaces.contains_key(&name) {
            return Err(ClusterError::AlreadyExists {
                kind: "namespace",
                name,
            });
        }

        let mut created = self.active_namespace(&name);
        created.metadata.labels = namespace.metadata.labels.clone();
        state.namespaces.insert(name, created.clone());
        Ok(created)
    }

    async fn delete_namespace(&self, name: &str) -> ClusterResult<()> {
        let mut state = self.state.lock();
        self.record(&mut state, FakeCall::DeleteNamespace(name.to_string()));
        Self::check_failure(&state, "delete_namespace", "namespace", name)?;

        if !state.namespaces.contains_key(name) {
            return Err(ClusterError::NotFound {
                kind: "namespace",
                name: name.to_string(),
            });
        }

        Self::remove_namespace_contents(&mut state, name);
        if state.hold_namespace_deletion {
            if let Some(namespace) = state.namespaces.get_mut(name) {
                namespace.metadata.deletion_timestamp = Some(Time(Utc::now()));
                namespace.status = Some(NamespaceStatus {
                    phase: Some("Terminating".to_string()),
                    ..Default::default()
                });
            }
        } else {
            state.namespaces.remove(name);
        }

        Ok(())
    }

    async fn clear_namespace_finalizers(&self, name: &str) -> ClusterResult<()> {
        let mut state = self.state.lock();
        self.record(
            &mut state,
            FakeCall::ClearNamespaceFinalizers(name.to_string()),
        );
        Self::check_failure(&state, "clear_namespace_finalizers", "namespace", name)?;

        let terminating = match state.namespaces.get(name) {
            Some(namespace) => namespace.metadata.deletion_timestamp.is_some(),
            None => {
                return Err(ClusterError::NotFound {
                    kind: "namespace",
                    name: name.to_string(),
                })
            }
        };
        if terminating {
            state.namespaces.remove(name);
        }

        Ok(())
    }

    async fn get_stateful_set(&self, namespace: &str, name: &str) -> ClusterResult<StatefulSet> {
        let mut state = self.state.lock();
        self.record(&mut state, FakeCall::GetStatefulSet(name.to_string()));
        Self::check_failure(&state, "get_stateful_set", "statefulset", name)?;

        state
            .stateful_sets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| ClusterError::NotFound {
                kind: "statefulset",
                name: name.to_string(),
            })
    }

    async fn create_stateful_set(
        &self,
        namespace: &str,
        stateful_set: &StatefulSet,
    ) -> ClusterResult<StatefulSet> {
        let name = object_name(&stateful_set.metadata);
        let mut state = self.state.lock();
        self.record(&mut state, FakeCall::CreateStatefulSet(name.clone()));
        Self::check_failure(&state, "create_stateful_set", "statefulset", &name)?;

        if !state.namespaces.contains_key(namespace) {
            return Err(ClusterError::NotFound {
                kind: "namespace",
                name: namespace.to_string(),
            });
        }
        let key = (namespace.to_string(), name.clone());
        if state.stateful_sets.contains_key(&key) {
            return Err(ClusterError::AlreadyExists {
                kind: "statefulset",
                name,
            });
        }

        let mut created = with_ready_status(stateful_set.clone());
        created.metadata.namespace = Some(namespace.to_string());
        created.metadata.resource_version = Some(self.next_resource_version());

        for ordinal in 0..replicas_of(&created) {
            for (template, labels) in claim_templates(&created) {
                let claim_name = claim_name(&template, &name, ordinal);
                let claim = PersistentVolumeClaim {
                    metadata: ObjectMeta {
                        name: Some(claim_name.clone()),
                        namespace: Some(namespace.to_string()),
                        labels: Some(labels),
                        ..Default::default()
                    },
                    spec: Some(PersistentVolumeClaimSpec::default()),
                    ..Default::default()
                };
                state
                    .claims
                    .insert((namespace.to_string(), claim_name), claim);
            }
        }

        state.stateful_sets.insert(key, created.clone());
        Ok(created)
    }

    async fn replace_stateful_set(
        &self,
        namespace: &str,
        stateful_set: &StatefulSet,
    ) -> ClusterResult<StatefulSet> {
        let name = object_name(&stateful_set.metadata);
        let replicas = replicas_of(stateful_set);
        let mut state = self.state.lock();
        self.record(
            &mut state,
            FakeCall::ReplaceStatefulSet {
                name: name.clone(),
                replicas,
            },
        );
        Self::check_failure(&state, "replace_stateful_set", "statefulset", &name)?;

        if state.conflicts_remaining > 0 {
            state.conflicts_remaining -= 1;
            return Err(ClusterError::Conflict {
                kind: "statefulset",
                name,
            });
        }

        let key = (namespace.to_string(), name.clone());
        let current_version = match state.stateful_sets.get(&key) {
            Some(current) => current.metadata.resource_version.clone(),
            None => {
                return Err(ClusterError::NotFound {
                    kind: "statefulset",
                    name,
                })
            }
        };
        if stateful_set.metadata.resource_version.is_some()
            && stateful_set.metadata.resource_version != current_version
        {
            return Err(ClusterError::Conflict {
                kind: "statefulset",
                name,
            });
        }

        let mut replaced = with_ready_status(stateful_set.clone());
        replaced.metadata.resource_version = Some(self.next_resource_version());

        let templates = claim_templates(&replaced);
        state.claims.retain(|(ns, claim), _| {
            ns != namespace
                || !templates.iter().any(|(template, _)| {
                    let prefix = format!("{template}-{name}-");
                    claim
                        .strip_prefix(&prefix)
                        .and_then(|ordinal| ordinal.parse::<i32>().ok())
                        .is_some_and(|ordinal| ordinal >= replicas)
                })
        });

        state.stateful_sets.insert(key, replaced.clone());
        Ok(replaced)
    }

    async fn delete_stateful_set(&self, namespace: &str, name: &str) -> ClusterResult<()> {
        let mut state = self.state.lock();
        self.record(&mut state, FakeCall::DeleteStatefulSet(name.to_string()));
        Self::check_failure(&state, "delete_stateful_set", "statefulset", name)?;

        let removed = state
            .stateful_sets
            .remove(&(namespace.to_string(), name.to_string()));
        let Some(removed) = removed else {
            return Err(ClusterError::NotFound {
                kind: "statefulset",
                name: name.to_string(),
            });
        };

        let templates = claim_templates(&removed);
        state.claims.retain(|(ns, claim), _| {
            ns != namespace
                || !templates
                    .iter()
                    .any(|(template, _)| claim.starts_with(&format!("{template}-{name}-")))
        });

        Ok(())
    }

    async fn get_persistent_volume_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> ClusterResult<PersistentVolumeClaim> {
        let previous_lookups = {
            let mut state = self.state.lock();
            self.record(
                &mut state,
                FakeCall::GetPersistentVolumeClaim(name.to_string()),
            );
            Self::check_failure(
                &state,
                "get_persistent_volume_claim",
                "persistentvolumeclaim",
                name,
            )?;

            let count = state.claim_lookups.entry(name.to_string()).or_default();
            *count += 1;
            *count - 1
        };

        if let Some(lookup) = self.claim_lookup.lock().as_mut() {
            return lookup(name, previous_lookups);
        }

        self.state
            .lock()
            .claims
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| Self::not_found(name))
    }

    async fn list_persistent_volume_claims(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> ClusterResult<Vec<PersistentVolumeClaim>> {
        let mut state = self.state.lock();
        self.record(
            &mut state,
            FakeCall::ListPersistentVolumeClaims(label_selector.map(str::to_string)),
        );
        Self::check_failure(
            &state,
            "list_persistent_volume_claims",
            "persistentvolumeclaim",
            "",
        )?;

        Ok(state
            .claims
            .iter()
            .filter(|((ns, _), claim)| ns == namespace && matches_selector(claim, label_selector))
            .map(|(_, claim)| claim.clone())
            .collect())
    }

    async fn clear_persistent_volume_claim_finalizers(
        &self,
        namespace: &str,
        name: &str,
    ) -> ClusterResult<()> {
        let mut state = self.state.lock();
        self.record(
            &mut state,
            FakeCall::ClearPersistentVolumeClaimFinalizers(name.to_string()),
        );
        Self::check_failure(
            &state,
            "clear_persistent_volume_claim_finalizers",
            "persistentvolumeclaim",
            name,
        )?;

        match state
            .claims
            .get_mut(&(namespace.to_string(), name.to_string()))
        {
            Some(claim) => {
                claim.metadata.finalizers = Some(Vec::new());
                Ok(())
            }
            None => Err(Self::not_found(name)),
        }
    }

    async fn server_version(&self) -> ClusterResult<String> {
        let mut state = self.state.lock();
        self.record(&mut state, FakeCall::ServerVersion);
        Self::check_failure(&state, "server_version", "version", "")?;

        Ok(state
            .server_version
            .clone()
            .unwrap_or_else(|| "v1.32.0-fake".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::StatefulSetSpec;
    use k8s_openapi::api::core::v1::PodTemplateSpec;

    fn stateful_set(name: &str, replicas: i32) -> StatefulSet {
        StatefulSet {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: Some(StatefulSetSpec {
                replicas: Some(replicas),
                template: PodTemplateSpec::default(),
                volume_claim_templates: Some(vec![PersistentVolumeClaim {
                    metadata: ObjectMeta {
                        name: Some("data".to_string()),
                        labels: Some(BTreeMap::from([("app".to_string(), name.to_string())])),
                        ..Default::default()
                    },
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_and_scale_down_manage_claims() {
        let cluster = FakeCluster::new();
        cluster.insert_namespace("ns");

        let created = cluster
            .create_stateful_set("ns", &stateful_set("sts", 3))
            .await
            .unwrap();
        assert_eq!(
            vec!["data-sts-0", "data-sts-1", "data-sts-2"],
            cluster.claim_names("ns")
        );

        let mut scaled = created.clone();
        scaled.spec.as_mut().unwrap().replicas = Some(1);
        cluster.replace_stateful_set("ns", &scaled).await.unwrap();
        assert_eq!(vec!["data-sts-0"], cluster.claim_names("ns"));

        // The stored object has moved on, so the original is now stale.
        let err = cluster
            .replace_stateful_set("ns", &created)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn label_selector_filters_claims() {
        let cluster = FakeCluster::new();
        cluster.insert_namespace("ns");
        cluster
            .create_stateful_set("ns", &stateful_set("a", 2))
            .await
            .unwrap();
        cluster
            .create_stateful_set("ns", &stateful_set("b", 1))
            .await
            .unwrap();

        let claims = cluster
            .list_persistent_volume_claims("ns", Some("app=a"))
            .await
            .unwrap();
        assert_eq!(2, claims.len());
        assert_eq!(
            3,
            cluster
                .list_persistent_volume_claims("ns", None)
                .await
                .unwrap()
                .len()
        );
    }

    #[tokio::test]
    async fn held_namespace_needs_finalizers_cleared() {
        let cluster = FakeCluster::new();
        cluster.hold_namespace_deletion();
        cluster.insert_namespace("ns");

        cluster.delete_namespace("ns").await.unwrap();
        let namespace = cluster.get_namespace("ns").await.unwrap();
        assert!(namespace.metadata.deletion_timestamp.is_some());

        cluster.clear_namespace_finalizers("ns").await.unwrap();
        assert!(cluster.get_namespace("ns").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn scripted_claim_lookup_counts_per_claim() {
        let cluster = FakeCluster::new();
        cluster.set_claim_lookup(|name, previous| {
            if previous == 0 {
                Ok(FakeCluster::bound_claim(name))
            } else {
                Err(FakeCluster::not_found(name))
            }
        });

        assert!(cluster.get_persistent_volume_claim("ns", "a").await.is_ok());
        assert!(cluster.get_persistent_volume_claim("ns", "b").await.is_ok());
        assert!(cluster
            .get_persistent_volume_claim("ns", "a")
            .await
            .unwrap_err()
            .is_not_found());
        assert_eq!(3, cluster.total_claim_lookups());
    }
}
