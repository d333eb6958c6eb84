use async_trait::async_trait;
use k8s_openapi::api::authentication::v1::SelfSubjectReview;
use k8s_openapi::api::authorization::v1::{
    ResourceAttributes, SelfSubjectAccessReview, SelfSubjectAccessReviewSpec, SubjectAccessReview,
    SubjectAccessReviewSpec,
};
use k8s_openapi::api::core::v1::{Namespace, Service};
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, PostParams};
use kube::Client;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::client::KubernetesClient;
use super::error::KubeError;
use super::resource::{EvaluationKind, LmEvalJobKind, LmEvalKind};
use super::services::{
    build_service_details, collect_model_serving_services, ServiceDetails, COMPONENT_LABEL_SELECTOR,
};
use crate::server::auth::RequestIdentity;
use crate::server::evaluation::models::{
    Evaluation, EvaluationList, LmEval, LmEvalJob, LmEvalJobList, LmEvalList,
};

/// Whose credential the underlying client carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credential {
    /// The server's own service account; access is checked with SubjectAccessReviews
    /// against the caller's user id
    ServiceAccount,
    /// The caller's bearer token; the cluster enforces RBAC directly
    Caller,
}

/// [`KubernetesClient`] backed by a real API server.
#[derive(Clone)]
pub struct ClusterClient {
    client: Client,
    credential: Credential,
    timeout: Duration,
}

impl ClusterClient {
    pub fn new(client: Client, credential: Credential, timeout: Duration) -> Self {
        Self {
            client,
            credential,
            timeout,
        }
    }

    /// Run one cluster call under the per-call deadline
    async fn bounded<T, F>(&self, operation: &str, call: F) -> Result<T, KubeError>
    where
        F: Future<Output = Result<T, KubeError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(KubeError::Deadline {
                operation: operation.to_string(),
                seconds: self.timeout.as_secs(),
            }),
        }
    }

    fn evaluation_api<K: EvaluationKind>(&self, namespace: &str) -> Api<DynamicObject> {
        let resource = K::DESCRIPTOR.api_resource();
        if namespace.is_empty() {
            Api::all_with(self.client.clone(), &resource)
        } else {
            Api::namespaced_with(self.client.clone(), namespace, &resource)
        }
    }

    async fn create_evaluation<K: EvaluationKind>(
        &self,
        identity: &RequestIdentity,
        namespace: &str,
        resource: &Evaluation<K>,
    ) -> Result<Evaluation<K>, KubeError> {
        let kind = K::DESCRIPTOR.kind;

        let mut resource = resource.clone();
        resource.metadata.namespace = namespace.to_string();
        resource.validate()?;

        let object = to_dynamic(&resource)?;
        let api = self.evaluation_api::<K>(namespace);
        let created = self
            .bounded(&format!("create {}", kind), async {
                api.create(&PostParams::default(), &object)
                    .await
                    .map_err(|e| KubeError::from_create(kind, namespace, e))
            })
            .await?;

        info!(
            kind,
            namespace,
            name = %resource.metadata.name,
            user = identity.user_id().unwrap_or("-"),
            "Created evaluation resource"
        );
        from_dynamic(created)
    }

    async fn get_evaluation<K: EvaluationKind>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Evaluation<K>, KubeError> {
        let kind = K::DESCRIPTOR.kind;
        let api = self.evaluation_api::<K>(namespace);
        let object = self
            .bounded(&format!("get {}", kind), async {
                api.get(name).await.map_err(|e| {
                    KubeError::from_api(
                        format!("failed to get {} {} in namespace {}", kind, name, namespace),
                        e,
                    )
                })
            })
            .await?;
        from_dynamic(object)
    }

    async fn list_evaluations<K: EvaluationKind>(
        &self,
        namespace: &str,
    ) -> Result<EvaluationList<K>, KubeError> {
        let plural = K::DESCRIPTOR.plural;
        let api = self.evaluation_api::<K>(namespace);
        let list = self
            .bounded(&format!("list {}", plural), async {
                api.list(&ListParams::default())
                    .await
                    .map_err(|e| KubeError::from_api(format!("failed to list {}", plural), e))
            })
            .await?;

        let resource_version = list.metadata.resource_version.clone();
        let items = convert_items::<K>(list.items);

        debug!(resource = plural, namespace, count = items.len(), "Listed evaluations");
        Ok(EvaluationList::new(items, resource_version))
    }

    async fn delete_evaluation<K: EvaluationKind>(
        &self,
        identity: &RequestIdentity,
        namespace: &str,
        name: &str,
    ) -> Result<(), KubeError> {
        let kind = K::DESCRIPTOR.kind;
        let api = self.evaluation_api::<K>(namespace);
        self.bounded(&format!("delete {}", kind), async {
            api.delete(name, &DeleteParams::default())
                .await
                .map_err(|e| {
                    KubeError::from_api(
                        format!("failed to delete {} {} in namespace {}", kind, name, namespace),
                        e,
                    )
                })
        })
        .await?;

        info!(
            kind,
            namespace,
            name,
            user = identity.user_id().unwrap_or("-"),
            "Deleted evaluation resource"
        );
        Ok(())
    }

    async fn list_services(
        &self,
        namespace: &str,
        params: ListParams,
    ) -> Result<Vec<Service>, KubeError> {
        if namespace.is_empty() {
            return Err(KubeError::InvalidInput("namespace cannot be empty".to_string()));
        }
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let list = self
            .bounded("list services", async {
                api.list(&params).await.map_err(|e| {
                    KubeError::from_api(
                        format!("failed to list services in namespace {}", namespace),
                        e,
                    )
                })
            })
            .await?;
        Ok(list.items)
    }

    /// Ask the API server whether the caller may perform `attributes`.
    async fn review_access(
        &self,
        identity: &RequestIdentity,
        attributes: ResourceAttributes,
    ) -> Result<bool, KubeError> {
        let status = match self.credential {
            Credential::ServiceAccount => {
                let user = identity.user_id().ok_or_else(|| {
                    KubeError::InvalidInput("a user id is required for access reviews".to_string())
                })?;
                let review = SubjectAccessReview {
                    spec: SubjectAccessReviewSpec {
                        user: Some(user.to_string()),
                        resource_attributes: Some(attributes),
                        ..Default::default()
                    },
                    ..Default::default()
                };
                let api: Api<SubjectAccessReview> = Api::all(self.client.clone());
                self.bounded("subject access review", async {
                    api.create(&PostParams::default(), &review)
                        .await
                        .map_err(|e| KubeError::from_api("subject access review failed", e))
                })
                .await?
                .status
            }
            Credential::Caller => {
                let review = SelfSubjectAccessReview {
                    spec: SelfSubjectAccessReviewSpec {
                        resource_attributes: Some(attributes),
                        ..Default::default()
                    },
                    ..Default::default()
                };
                let api: Api<SelfSubjectAccessReview> = Api::all(self.client.clone());
                self.bounded("self subject access review", async {
                    api.create(&PostParams::default(), &review)
                        .await
                        .map_err(|e| KubeError::from_api("self subject access review failed", e))
                })
                .await?
                .status
            }
        };

        Ok(status.map(|s| s.allowed).unwrap_or(false))
    }
}

fn to_dynamic<K: EvaluationKind>(resource: &Evaluation<K>) -> Result<DynamicObject, KubeError> {
    let value = serde_json::to_value(resource)
        .map_err(|e| KubeError::conversion(K::DESCRIPTOR.kind, e))?;
    serde_json::from_value(value).map_err(|e| KubeError::conversion(K::DESCRIPTOR.kind, e))
}

fn from_dynamic<K: EvaluationKind>(object: DynamicObject) -> Result<Evaluation<K>, KubeError> {
    let mut value =
        serde_json::to_value(&object).map_err(|e| KubeError::conversion(K::DESCRIPTOR.kind, e))?;

    // List items may come back without type tags
    if let Some(map) = value.as_object_mut() {
        map.entry("apiVersion")
            .or_insert_with(|| K::DESCRIPTOR.api_version().into());
        map.entry("kind")
            .or_insert_with(|| K::DESCRIPTOR.kind.into());
    }

    serde_json::from_value(value).map_err(|e| KubeError::conversion(K::DESCRIPTOR.kind, e))
}

/// Convert listed objects, skipping (and logging) the ones that do not fit the resource shape
fn convert_items<K: EvaluationKind>(objects: Vec<DynamicObject>) -> Vec<Evaluation<K>> {
    objects
        .into_iter()
        .filter_map(|object| {
            let name = object.metadata.name.clone().unwrap_or_default();
            match from_dynamic::<K>(object) {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!(
                        resource = K::DESCRIPTOR.plural,
                        name = %name,
                        "Skipping unconvertible item: {}",
                        e
                    );
                    None
                }
            }
        })
        .collect()
}

fn attributes(
    verb: &str,
    resource: &str,
    namespace: Option<&str>,
    name: Option<&str>,
) -> ResourceAttributes {
    ResourceAttributes {
        verb: Some(verb.to_string()),
        resource: Some(resource.to_string()),
        namespace: namespace.map(str::to_string),
        name: name.map(str::to_string),
        ..Default::default()
    }
}

#[async_trait]
impl KubernetesClient for ClusterClient {
    async fn get_namespaces(
        &self,
        identity: &RequestIdentity,
    ) -> Result<Vec<Namespace>, KubeError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let namespaces = self
            .bounded("list namespaces", async {
                api.list(&ListParams::default())
                    .await
                    .map_err(|e| KubeError::from_api("failed to list namespaces", e))
            })
            .await?
            .items;

        if self.credential == Credential::Caller || self.is_cluster_admin(identity).await? {
            return Ok(namespaces);
        }

        let mut visible = Vec::new();
        for namespace in namespaces {
            let name = namespace.metadata.name.clone().unwrap_or_default();
            match self.can_list_services_in_namespace(identity, &name).await {
                Ok(true) => visible.push(namespace),
                Ok(false) => {}
                Err(e) => warn!(namespace = %name, "Access review failed, hiding namespace: {}", e),
            }
        }
        Ok(visible)
    }

    async fn can_list_services_in_namespace(
        &self,
        identity: &RequestIdentity,
        namespace: &str,
    ) -> Result<bool, KubeError> {
        self.review_access(identity, attributes("list", "services", Some(namespace), None))
            .await
    }

    async fn can_access_service_in_namespace(
        &self,
        identity: &RequestIdentity,
        namespace: &str,
        service_name: &str,
    ) -> Result<bool, KubeError> {
        self.review_access(
            identity,
            attributes("get", "services", Some(namespace), Some(service_name)),
        )
        .await
    }

    async fn is_cluster_admin(&self, identity: &RequestIdentity) -> Result<bool, KubeError> {
        let mut all = attributes("*", "*", None, None);
        all.group = Some("*".to_string());
        self.review_access(identity, all).await
    }

    async fn get_user(&self, identity: &RequestIdentity) -> Result<String, KubeError> {
        match self.credential {
            Credential::ServiceAccount => identity
                .user_id()
                .map(str::to_string)
                .ok_or_else(|| KubeError::InvalidInput("missing user id".to_string())),
            Credential::Caller => {
                let api: Api<SelfSubjectReview> = Api::all(self.client.clone());
                let review = self
                    .bounded("self subject review", async {
                        api.create(&PostParams::default(), &SelfSubjectReview::default())
                            .await
                            .map_err(|e| KubeError::from_api("self subject review failed", e))
                    })
                    .await?;
                review
                    .status
                    .and_then(|s| s.user_info)
                    .and_then(|u| u.username)
                    .filter(|u| !u.is_empty())
                    .ok_or_else(|| {
                        KubeError::Forbidden("token does not resolve to a user".to_string())
                    })
            }
        }
    }

    async fn get_service_details(&self, namespace: &str) -> Result<Vec<ServiceDetails>, KubeError> {
        let services = self
            .list_services(namespace, ListParams::default().labels(COMPONENT_LABEL_SELECTOR))
            .await?;

        Ok(services
            .iter()
            .filter_map(|service| match build_service_details(service) {
                Ok(details) => Some(details),
                Err(e) => {
                    warn!("Skipping service: {}", e);
                    None
                }
            })
            .collect())
    }

    async fn get_service_details_by_name(
        &self,
        namespace: &str,
        service_name: &str,
    ) -> Result<ServiceDetails, KubeError> {
        if namespace.is_empty() || service_name.is_empty() {
            return Err(KubeError::InvalidInput(
                "namespace and service name cannot be empty".to_string(),
            ));
        }
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let service = self
            .bounded("get service", async {
                api.get(service_name).await.map_err(|e| {
                    KubeError::from_api(
                        format!(
                            "failed to get service \"{}\" in namespace \"{}\"",
                            service_name, namespace
                        ),
                        e,
                    )
                })
            })
            .await?;
        build_service_details(&service)
    }

    async fn get_model_serving_services(
        &self,
        namespace: &str,
    ) -> Result<Vec<ServiceDetails>, KubeError> {
        let services = self.list_services(namespace, ListParams::default()).await?;
        Ok(collect_model_serving_services(&services))
    }

    async fn create_lm_eval(
        &self,
        identity: &RequestIdentity,
        namespace: &str,
        resource: &LmEval,
    ) -> Result<LmEval, KubeError> {
        self.create_evaluation(identity, namespace, resource).await
    }

    async fn get_lm_eval(
        &self,
        _identity: &RequestIdentity,
        namespace: &str,
        name: &str,
    ) -> Result<LmEval, KubeError> {
        self.get_evaluation(namespace, name).await
    }

    async fn list_lm_evals(
        &self,
        _identity: &RequestIdentity,
        namespace: &str,
    ) -> Result<LmEvalList, KubeError> {
        self.list_evaluations(namespace).await
    }

    async fn delete_lm_eval(
        &self,
        identity: &RequestIdentity,
        namespace: &str,
        name: &str,
    ) -> Result<(), KubeError> {
        self.delete_evaluation::<LmEvalKind>(identity, namespace, name)
            .await
    }

    async fn create_lm_eval_job(
        &self,
        identity: &RequestIdentity,
        namespace: &str,
        resource: &LmEvalJob,
    ) -> Result<LmEvalJob, KubeError> {
        self.create_evaluation(identity, namespace, resource).await
    }

    async fn get_lm_eval_job(
        &self,
        _identity: &RequestIdentity,
        namespace: &str,
        name: &str,
    ) -> Result<LmEvalJob, KubeError> {
        self.get_evaluation(namespace, name).await
    }

    async fn list_lm_eval_jobs(
        &self,
        _identity: &RequestIdentity,
        namespace: &str,
    ) -> Result<LmEvalJobList, KubeError> {
        self.list_evaluations(namespace).await
    }

    async fn delete_lm_eval_job(
        &self,
        identity: &RequestIdentity,
        namespace: &str,
        name: &str,
    ) -> Result<(), KubeError> {
        self.delete_evaluation::<LmEvalJobKind>(identity, namespace, name)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::evaluation::models::ModelArg;
    use axum::http::Uri;

    /// Client pointed at a port nothing listens on; any request that reaches the
    /// network fails, so a passing test proves the call never left the process.
    fn unreachable_client(timeout: Duration) -> ClusterClient {
        let config = kube::Config::new("http://127.0.0.1:9".parse::<Uri>().unwrap());
        let client = Client::try_from(config).unwrap();
        ClusterClient::new(client, Credential::Caller, timeout)
    }

    fn job(name: &str) -> LmEvalJob {
        let mut job = LmEvalJob::new("ns1", name);
        job.spec.model = "local-completions".to_string();
        job.spec.model_args = vec![ModelArg::new("model", "foo")];
        job.spec.task_list.task_names = vec!["hellaswag".to_string()];
        job
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_job_locally() {
        let client = unreachable_client(Duration::from_secs(30));
        let identity = RequestIdentity::default();

        let mut missing_model = job("eval-1");
        missing_model.spec.model.clear();
        let err = client
            .create_lm_eval_job(&identity, "ns1", &missing_model)
            .await
            .unwrap_err();
        assert!(matches!(err, KubeError::InvalidInput(_)), "got {:?}", err);

        let mut no_tasks = job("eval-1");
        no_tasks.spec.task_list.task_names.clear();
        let err = client
            .create_lm_eval_job(&identity, "ns1", &no_tasks)
            .await
            .unwrap_err();
        assert!(matches!(err, KubeError::InvalidInput(_)), "got {:?}", err);

        let err = client
            .create_lm_eval_job(&identity, "ns1", &job("-eval"))
            .await
            .unwrap_err();
        assert!(matches!(err, KubeError::InvalidInput(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_bounded_call_reports_deadline() {
        let client = unreachable_client(Duration::from_millis(10));
        let result: Result<(), KubeError> = client
            .bounded("wait forever", std::future::pending())
            .await;
        assert!(matches!(result, Err(KubeError::Deadline { .. })));
    }

    #[tokio::test]
    async fn test_service_listing_requires_namespace() {
        let client = unreachable_client(Duration::from_secs(30));
        let err = client.get_model_serving_services("").await.unwrap_err();
        assert!(matches!(err, KubeError::InvalidInput(_)));
    }

    #[test]
    fn test_dynamic_conversion_preserves_spec() {
        let object = to_dynamic(&job("eval-1")).unwrap();
        assert_eq!(object.metadata.name.as_deref(), Some("eval-1"));
        assert_eq!(object.data["spec"]["model"], "local-completions");

        let back: LmEvalJob = from_dynamic(object).unwrap();
        assert_eq!(back, job("eval-1"));
    }

    #[test]
    fn test_from_dynamic_fills_missing_type_tags() {
        let object: DynamicObject = serde_json::from_value(serde_json::json!({
            "metadata": {"name": "eval-2", "namespace": "ns1", "resourceVersion": "42"},
            "spec": {"model": "hf", "taskList": {"taskNames": ["mmlu"]}}
        }))
        .unwrap();

        let job: LmEvalJob = from_dynamic(object).unwrap();
        assert_eq!(job.kind, "LMEvalJob");
        assert_eq!(job.metadata.resource_version.as_deref(), Some("42"));
    }

    #[test]
    fn test_convert_items_skips_malformed_objects() {
        let valid = to_dynamic(&job("eval-1")).unwrap();
        let malformed: DynamicObject = serde_json::from_value(serde_json::json!({
            "metadata": {"name": "broken", "namespace": "ns1"},
            "spec": {"model": 5, "taskList": {"taskNames": "not-a-list"}}
        }))
        .unwrap();

        let items = convert_items::<LmEvalJobKind>(vec![malformed, valid]);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].metadata.name, "eval-1");
    }
}
