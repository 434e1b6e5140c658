use anyhow::{bail, Context};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{Namespace, PersistentVolumeClaim};
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config};

use crate::api::ClusterApi;
use crate::error::{ClusterError, ClusterResult};

const NAMESPACE: &str = "namespace";
const STATEFUL_SET: &str = "statefulset";
const PVC: &str = "persistentvolumeclaim";

/// [ClusterApi] backed by a real Kubernetes API server.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    /// Wrap an existing kube client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using the local kubeconfig.
    ///
    /// If `expected_context` is set, refuse to connect unless it is the kubeconfig's current
    /// context. The benchmark creates and deletes many objects, so it should only point at a
    /// disposable cluster.
    pub async fn connect(expected_context: Option<&str>) -> anyhow::Result<Self> {
        let kubeconfig = Kubeconfig::read().context("Failed to read kubeconfig")?;

        if let Some(expected) = expected_context {
            let current = kubeconfig.current_context.as_deref().unwrap_or_default();
            if current != expected {
                bail!("Refusing to run: kubeconfig context is {current:?}, expected {expected:?}");
            }
        }

        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .context("Failed to build client config from kubeconfig")?;
        let client = Client::try_from(config).context("Failed to create Kubernetes client")?;

        Ok(Self::new(client))
    }

    fn namespaces(&self) -> Api<Namespace> {
        Api::all(self.client.clone())
    }

    fn stateful_sets(&self, namespace: &str) -> Api<StatefulSet> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn claims(&self, namespace: &str) -> Api<PersistentVolumeClaim> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn object_name(metadata: &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta) -> &str {
    metadata.name.as_deref().unwrap_or_default()
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn get_namespace(&self, name: &str) -> ClusterResult<Namespace> {
        self.namespaces()
            .get(name)
            .await
            .map_err(|e| ClusterError::from_kube(NAMESPACE, name, e))
    }

    async fn list_namespaces(&self) -> ClusterResult<Vec<Namespace>> {
        self.namespaces()
            .list(&ListParams::default())
            .await
            .map(|list| list.items)
            .map_err(|e| ClusterError::from_kube(NAMESPACE, "", e))
    }

    async fn create_namespace(&self, namespace: &Namespace) -> ClusterResult<Namespace> {
        self.namespaces()
            .create(&PostParams::default(), namespace)
            .await
            .map_err(|e| ClusterError::from_kube(NAMESPACE, object_name(&namespace.metadata), e))
    }

    async fn delete_namespace(&self, name: &str) -> ClusterResult<()> {
        self.namespaces()
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| ClusterError::from_kube(NAMESPACE, name, e))
    }

    async fn clear_namespace_finalizers(&self, name: &str) -> ClusterResult<()> {
        let patch = serde_json::json!({ "spec": { "finalizers": [] } });
        self.namespaces()
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map(|_| ())
            .map_err(|e| ClusterError::from_kube(NAMESPACE, name, e))
    }

    async fn get_stateful_set(&self, namespace: &str, name: &str) -> ClusterResult<StatefulSet> {
        self.stateful_sets(namespace)
            .get(name)
            .await
            .map_err(|e| ClusterError::from_kube(STATEFUL_SET, name, e))
    }

    async fn create_stateful_set(
        &self,
        namespace: &str,
        stateful_set: &StatefulSet,
    ) -> ClusterResult<StatefulSet> {
        self.stateful_sets(namespace)
            .create(&PostParams::default(), stateful_set)
            .await
            .map_err(|e| {
                ClusterError::from_kube(STATEFUL_SET, object_name(&stateful_set.metadata), e)
            })
    }

    async fn replace_stateful_set(
        &self,
        namespace: &str,
        stateful_set: &StatefulSet,
    ) -> ClusterResult<StatefulSet> {
        let name = object_name(&stateful_set.metadata);
        self.stateful_sets(namespace)
            .replace(name, &PostParams::default(), stateful_set)
            .await
            .map_err(|e| ClusterError::from_kube(STATEFUL_SET, name, e))
    }

    async fn delete_stateful_set(&self, namespace: &str, name: &str) -> ClusterResult<()> {
        self.stateful_sets(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| ClusterError::from_kube(STATEFUL_SET, name, e))
    }

    async fn get_persistent_volume_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> ClusterResult<PersistentVolumeClaim> {
        self.claims(namespace)
            .get(name)
            .await
            .map_err(|e| ClusterError::from_kube(PVC, name, e))
    }

    async fn list_persistent_volume_claims(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> ClusterResult<Vec<PersistentVolumeClaim>> {
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }

        self.claims(namespace)
            .list(&params)
            .await
            .map(|list| list.items)
            .map_err(|e| ClusterError::from_kube(PVC, "", e))
    }

    async fn clear_persistent_volume_claim_finalizers(
        &self,
        namespace: &str,
        name: &str,
    ) -> ClusterResult<()> {
        let patch = serde_json::json!({ "metadata": { "finalizers": [] } });
        self.claims(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map(|_| ())
            .map_err(|e| ClusterError::from_kube(PVC, name, e))
    }

    async fn server_version(&self) -> ClusterResult<String> {
        self.client
            .apiserver_version()
            .await
            .map(|info| info.git_version)
            .map_err(|e| ClusterError::from_kube("version", "", e))
    }
}
