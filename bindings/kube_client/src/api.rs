use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{Namespace, PersistentVolumeClaim};

use crate::error::ClusterResult;

/// The cluster operations used by the benchmark.
///
/// Every call is a single request with no retries. Lookups report a missing object as
/// [crate::prelude::ClusterError::NotFound] so that callers can treat absence as a state rather
/// than a failure.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn get_namespace(&self, name: &str) -> ClusterResult<Namespace>;

    async fn list_namespaces(&self) -> ClusterResult<Vec<Namespace>>;

    async fn create_namespace(&self, namespace: &Namespace) -> ClusterResult<Namespace>;

    async fn delete_namespace(&self, name: &str) -> ClusterResult<()>;

    /// Merge patch the namespace spec finalizers to an empty list.
    async fn clear_namespace_finalizers(&self, name: &str) -> ClusterResult<()>;

    async fn get_stateful_set(&self, namespace: &str, name: &str) -> ClusterResult<StatefulSet>;

    async fn create_stateful_set(
        &self,
        namespace: &str,
        stateful_set: &StatefulSet,
    ) -> ClusterResult<StatefulSet>;

    /// Replace the object. Fails with [crate::prelude::ClusterError::Conflict] if the resource
    /// version is stale.
    async fn replace_stateful_set(
        &self,
        namespace: &str,
        stateful_set: &StatefulSet,
    ) -> ClusterResult<StatefulSet>;

    async fn delete_stateful_set(&self, namespace: &str, name: &str) -> ClusterResult<()>;

    async fn get_persistent_volume_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> ClusterResult<PersistentVolumeClaim>;

    async fn list_persistent_volume_claims(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> ClusterResult<Vec<PersistentVolumeClaim>>;

    /// Merge patch the claim's metadata finalizers to an empty list.
    async fn clear_persistent_volume_claim_finalizers(
        &self,
        namespace: &str,
        name: &str,
    ) -> ClusterResult<()>;

    /// The `gitVersion` reported by the API server.
    async fn server_version(&self) -> ClusterResult<String>;
}
