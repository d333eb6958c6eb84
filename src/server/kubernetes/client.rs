use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;

use super::error::KubeError;
use super::services::ServiceDetails;
use crate::server::auth::RequestIdentity;
use crate::server::evaluation::models::{LmEval, LmEvalJob, LmEvalJobList, LmEvalList};

/// Operations the HTTP layer performs against the cluster on behalf of one caller.
///
/// Implementations are bound to a credential when they are handed out by a
/// [`ClientFactory`](crate::server::auth::ClientFactory); the identity passed to each call
/// is used for access reviews and logging, never to pick credentials.
#[async_trait]
pub trait KubernetesClient: Send + Sync {
    /// Namespaces the caller may work in
    async fn get_namespaces(&self, identity: &RequestIdentity) -> Result<Vec<Namespace>, KubeError>;

    async fn can_list_services_in_namespace(
        &self,
        identity: &RequestIdentity,
        namespace: &str,
    ) -> Result<bool, KubeError>;

    async fn can_access_service_in_namespace(
        &self,
        identity: &RequestIdentity,
        namespace: &str,
        service_name: &str,
    ) -> Result<bool, KubeError>;

    async fn is_cluster_admin(&self, identity: &RequestIdentity) -> Result<bool, KubeError>;

    /// User name as the cluster sees it
    async fn get_user(&self, identity: &RequestIdentity) -> Result<String, KubeError>;

    async fn get_service_names(&self, namespace: &str) -> Result<Vec<String>, KubeError> {
        let services = self.get_service_details(namespace).await?;
        Ok(services.into_iter().map(|s| s.name).collect())
    }

    /// Services labelled as dashboard components; each must expose an `http-api` port
    async fn get_service_details(&self, namespace: &str) -> Result<Vec<ServiceDetails>, KubeError>;

    async fn get_service_details_by_name(
        &self,
        namespace: &str,
        service_name: &str,
    ) -> Result<ServiceDetails, KubeError>;

    /// Services that look like model servers, with the port to reach them on
    async fn get_model_serving_services(
        &self,
        namespace: &str,
    ) -> Result<Vec<ServiceDetails>, KubeError>;

    async fn create_lm_eval(
        &self,
        identity: &RequestIdentity,
        namespace: &str,
        resource: &LmEval,
    ) -> Result<LmEval, KubeError>;

    async fn get_lm_eval(
        &self,
        identity: &RequestIdentity,
        namespace: &str,
        name: &str,
    ) -> Result<LmEval, KubeError>;

    /// An empty `namespace` lists across all namespaces
    async fn list_lm_evals(
        &self,
        identity: &RequestIdentity,
        namespace: &str,
    ) -> Result<LmEvalList, KubeError>;

    async fn delete_lm_eval(
        &self,
        identity: &RequestIdentity,
        namespace: &str,
        name: &str,
    ) -> Result<(), KubeError>;

    async fn create_lm_eval_job(
        &self,
        identity: &RequestIdentity,
        namespace: &str,
        resource: &LmEvalJob,
    ) -> Result<LmEvalJob, KubeError>;

    async fn get_lm_eval_job(
        &self,
        identity: &RequestIdentity,
        namespace: &str,
        name: &str,
    ) -> Result<LmEvalJob, KubeError>;

    /// An empty `namespace` lists across all namespaces
    async fn list_lm_eval_jobs(
        &self,
        identity: &RequestIdentity,
        namespace: &str,
    ) -> Result<LmEvalJobList, KubeError>;

    async fn delete_lm_eval_job(
        &self,
        identity: &RequestIdentity,
        namespace: &str,
        name: &str,
    ) -> Result<(), KubeError>;
}
