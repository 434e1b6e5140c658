mod api;
mod error;
#[cfg(any(test, feature = "fake"))]
mod fake;
mod kube_cluster;

pub mod prelude {
    pub use crate::api::ClusterApi;
    pub use crate::error::{ClusterError, ClusterResult};
    #[cfg(any(test, feature = "fake"))]
    pub use crate::fake::{FakeCall, FakeCluster};
    pub use crate::kube_cluster::KubeCluster;

    // Types defined in other crates should be fetched directly, but the object types that appear
    // in the [ClusterApi] are re-exported here so that callers use the same versions.
    pub use k8s_openapi::api::apps::v1::StatefulSet;
    pub use k8s_openapi::api::core::v1::{Namespace, PersistentVolumeClaim};
}
