use thiserror::Error;

/// Failure of a single operation against the Kubernetes API.
///
/// Cluster-reported statuses (404, 403, 409) are kept apart so the HTTP layer can
/// translate them instead of reporting every failure as a server error.
#[derive(Debug, Error)]
pub enum KubeError {
    /// Rejected locally before any cluster call was made
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    /// The custom resource definition is not installed on the cluster
    #[error("{0}")]
    CrdNotFound(String),

    #[error("{operation} timed out after {seconds}s")]
    Deadline { operation: String, seconds: u64 },

    #[error("failed to convert {what}: {source}")]
    Conversion {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{context}: {source}")]
    Api {
        context: String,
        #[source]
        source: kube::Error,
    },
}

impl KubeError {
    /// Wrap a kube error with operation context, keeping the cluster's status class.
    pub fn from_api(context: impl Into<String>, source: kube::Error) -> Self {
        let context = context.into();
        match &source {
            kube::Error::Api(response) => match response.code {
                404 => KubeError::NotFound(format!("{}: {}", context, response.message)),
                403 => KubeError::Forbidden(format!("{}: {}", context, response.message)),
                409 => KubeError::Conflict(format!("{}: {}", context, response.message)),
                _ => KubeError::Api { context, source },
            },
            _ => KubeError::Api { context, source },
        }
    }

    /// Translate a failed create, which reports a missing CRD and RBAC denials more explicitly.
    pub fn from_create(kind: &str, namespace: &str, source: kube::Error) -> Self {
        let message = source.to_string();
        let missing_crd = message.contains("no matches for kind")
            || matches!(&source, kube::Error::Api(response)
                if response.code == 404
                    && response.message.contains("could not find the requested resource"));

        if missing_crd {
            return KubeError::CrdNotFound(format!(
                "{} CRD not found, make sure the TrustyAI operator is installed: {}",
                kind, message
            ));
        }
        if matches!(&source, kube::Error::Api(response) if response.code == 403) {
            return KubeError::Forbidden(format!(
                "insufficient permissions to create {} in namespace {}: {}",
                kind, namespace, message
            ));
        }

        KubeError::from_api(format!("failed to create {}", kind), source)
    }

    pub fn conversion(what: impl Into<String>, source: serde_json::Error) -> Self {
        KubeError::Conversion {
            what: what.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16, message: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: message.to_string(),
            reason: String::new(),
            code,
        })
    }

    #[test]
    fn test_from_api_keeps_status_class() {
        assert!(matches!(
            KubeError::from_api("get", api_error(404, "lmevaljobs \"x\" not found")),
            KubeError::NotFound(_)
        ));
        assert!(matches!(
            KubeError::from_api("get", api_error(403, "forbidden")),
            KubeError::Forbidden(_)
        ));
        assert!(matches!(
            KubeError::from_api("create", api_error(409, "already exists")),
            KubeError::Conflict(_)
        ));
        assert!(matches!(
            KubeError::from_api("list", api_error(500, "etcd unavailable")),
            KubeError::Api { .. }
        ));
    }

    #[test]
    fn test_from_create_detects_missing_crd() {
        let err = KubeError::from_create(
            "LMEvalJob",
            "ns1",
            api_error(404, "the server could not find the requested resource"),
        );
        assert!(matches!(err, KubeError::CrdNotFound(_)));
        assert!(err.to_string().contains("LMEvalJob CRD not found"));
    }

    #[test]
    fn test_from_create_mentions_namespace_when_forbidden() {
        let err = KubeError::from_create("LMEvalJob", "team-a", api_error(403, "denied"));
        assert!(matches!(err, KubeError::Forbidden(_)));
        assert!(err.to_string().contains("namespace team-a"));
    }
}
