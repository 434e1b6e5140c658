pub type ClusterResult<T> = Result<T, ClusterError>;

/// Errors from the cluster API, classified the way the benchmark needs to react to them.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// The object does not exist. Expected when waiting for deletion.
    #[error("{kind} {name:?} not found")]
    NotFound { kind: &'static str, name: String },
    /// Create found an existing object with the same name.
    #[error("{kind} {name:?} already exists")]
    AlreadyExists { kind: &'static str, name: String },
    /// An update raced with another writer and was rejected. Safe to retry after a fresh read.
    #[error("conflicting update to {kind} {name:?}")]
    Conflict { kind: &'static str, name: String },
    /// Any other status returned by the API server.
    #[error("API server returned {code} for {kind} {name:?}: {message}")]
    Api {
        kind: &'static str,
        name: String,
        code: u16,
        message: String,
    },
    /// The request did not get a response from the API server.
    #[error("Kubernetes client error for {kind} {name:?}")]
    Client {
        kind: &'static str,
        name: String,
        #[source]
        source: kube::Error,
    },
}

impl ClusterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub(crate) fn from_kube(kind: &'static str, name: &str, err: kube::Error) -> Self {
        let name = name.to_string();
        match err {
            kube::Error::Api(response) if response.code == 404 => Self::NotFound { kind, name },
            kube::Error::Api(response)
                if response.code == 409 && response.reason == "AlreadyExists" =>
            {
                Self::AlreadyExists { kind, name }
            }
            kube::Error::Api(response) if response.code == 409 => Self::Conflict { kind, name },
            kube::Error::Api(response) => Self::Api {
                kind,
                name,
                code: response.code,
                message: response.message,
            },
            source => Self::Client { kind, name, source },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{reason} happened"),
            reason: reason.to_string(),
            code,
        })
    }

    #[test]
    fn classify_api_errors() {
        assert!(ClusterError::from_kube("pvc", "a", api_error(404, "NotFound")).is_not_found());
        assert!(
            ClusterError::from_kube("namespace", "a", api_error(409, "AlreadyExists"))
                .is_already_exists()
        );
        assert!(ClusterError::from_kube("statefulset", "a", api_error(409, "Conflict")).is_conflict());

        let err = ClusterError::from_kube("pvc", "a", api_error(500, "InternalError"));
        assert!(matches!(err, ClusterError::Api { code: 500, .. }));
        assert_eq!(
            "API server returned 500 for pvc \"a\": InternalError happened",
            err.to_string()
        );
    }
}
