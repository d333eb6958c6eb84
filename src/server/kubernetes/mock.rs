use async_trait::async_trait;
use chrono::{Duration, Utc};
use k8s_openapi::api::core::v1::Namespace;
use kube::api::ObjectMeta;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::client::KubernetesClient;
use super::error::KubeError;
use super::resource::{EvaluationKind, LmEvalJobKind, LmEvalKind};
use super::services::ServiceDetails;
use crate::server::auth::RequestIdentity;
use crate::server::evaluation::models::{
    Evaluation, EvaluationList, EvaluationStatus, LmEval, LmEvalJob, LmEvalJobList, LmEvalList,
    DISPLAY_NAME_ANNOTATION,
};

/// User treated as cluster admin by the mock
pub const MOCK_ADMIN_USER: &str = "admin@example.com";

/// In-memory stand-in for the cluster, used by the `mock` auth method and in tests.
///
/// Evaluations are kept as raw JSON per resource plural, in insertion order, the way the
/// API server would hand them back.
pub struct MockClient {
    store: RwLock<BTreeMap<&'static str, Vec<serde_json::Value>>>,
    resource_version: AtomicU64,
}

impl Default for MockClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClient {
    /// Mock seeded with demo namespaces, evaluations and model servers
    pub fn new() -> Self {
        Self::with_store(BTreeMap::from([
            (
                LmEvalKind::DESCRIPTOR.plural,
                demo_evaluations::<LmEvalKind>(),
            ),
            (
                LmEvalJobKind::DESCRIPTOR.plural,
                demo_evaluations::<LmEvalJobKind>(),
            ),
        ]))
    }

    /// Mock without any evaluations
    #[cfg(test)]
    pub fn empty() -> Self {
        Self::with_store(BTreeMap::new())
    }

    fn with_store(store: BTreeMap<&'static str, Vec<serde_json::Value>>) -> Self {
        Self {
            store: RwLock::new(store),
            resource_version: AtomicU64::new(1),
        }
    }

    fn next_resource_version(&self) -> String {
        (self.resource_version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    async fn create<K: EvaluationKind>(
        &self,
        identity: &RequestIdentity,
        namespace: &str,
        resource: &Evaluation<K>,
    ) -> Result<Evaluation<K>, KubeError> {
        let kind = K::DESCRIPTOR.kind;
        let mut created = resource.clone();
        created.metadata.namespace = namespace.to_string();
        created.validate()?;

        let mut store = self.store.write().await;
        let items = store.entry(K::DESCRIPTOR.plural).or_default();
        if items
            .iter()
            .any(|item| key_of(item) == (namespace, created.metadata.name.as_str()))
        {
            return Err(KubeError::Conflict(format!(
                "{} \"{}\" already exists in namespace {}",
                kind, created.metadata.name, namespace
            )));
        }

        created.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
        created.metadata.creation_timestamp = Some(Utc::now());
        created.metadata.resource_version = Some(self.next_resource_version());
        created.status = Some(EvaluationStatus {
            state: Some("Pending".to_string()),
            message: Some("Mock evaluation created successfully".to_string()),
            reason: Some("EvaluationPending".to_string()),
            ..Default::default()
        });

        let value = serde_json::to_value(&created).map_err(|e| KubeError::conversion(kind, e))?;
        items.push(value);

        info!(
            kind,
            namespace,
            name = %created.metadata.name,
            user = identity.user_id().unwrap_or("-"),
            "Mock: created evaluation"
        );
        Ok(created)
    }

    async fn get<K: EvaluationKind>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Evaluation<K>, KubeError> {
        let kind = K::DESCRIPTOR.kind;
        let store = self.store.read().await;
        let value = store
            .get(K::DESCRIPTOR.plural)
            .and_then(|items| items.iter().find(|item| key_of(item) == (namespace, name)))
            .ok_or_else(|| {
                KubeError::NotFound(format!(
                    "{} \"{}\" not found in namespace {}",
                    kind, name, namespace
                ))
            })?;
        serde_json::from_value(value.clone()).map_err(|e| KubeError::conversion(kind, e))
    }

    async fn list<K: EvaluationKind>(
        &self,
        namespace: &str,
    ) -> Result<EvaluationList<K>, KubeError> {
        let store = self.store.read().await;
        let items = store
            .get(K::DESCRIPTOR.plural)
            .map(|items| {
                items
                    .iter()
                    .filter(|item| namespace.is_empty() || key_of(item).0 == namespace)
                    .filter_map(|item| match serde_json::from_value(item.clone()) {
                        Ok(evaluation) => Some(evaluation),
                        Err(e) => {
                            warn!(
                                resource = K::DESCRIPTOR.plural,
                                name = key_of(item).1,
                                "Skipping unconvertible item: {}",
                                e
                            );
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        let resource_version = self.resource_version.load(Ordering::SeqCst).to_string();
        Ok(EvaluationList::new(items, Some(resource_version)))
    }

    async fn delete<K: EvaluationKind>(
        &self,
        identity: &RequestIdentity,
        namespace: &str,
        name: &str,
    ) -> Result<(), KubeError> {
        let kind = K::DESCRIPTOR.kind;
        let mut store = self.store.write().await;
        let items = store.entry(K::DESCRIPTOR.plural).or_default();
        let position = items
            .iter()
            .position(|item| key_of(item) == (namespace, name))
            .ok_or_else(|| {
                KubeError::NotFound(format!(
                    "{} \"{}\" not found in namespace {}",
                    kind, name, namespace
                ))
            })?;
        items.remove(position);

        info!(
            kind,
            namespace,
            name,
            user = identity.user_id().unwrap_or("-"),
            "Mock: deleted evaluation"
        );
        Ok(())
    }
}

fn key_of(item: &serde_json::Value) -> (&str, &str) {
    let metadata = &item["metadata"];
    (
        metadata["namespace"].as_str().unwrap_or_default(),
        metadata["name"].as_str().unwrap_or_default(),
    )
}

struct DemoEvaluation {
    namespace: &'static str,
    name: &'static str,
    display_name: &'static str,
    age_hours: i64,
    model: &'static str,
    tasks: [&'static str; 2],
    batch_size: &'static str,
    allow_code_execution: bool,
    allow_online: bool,
    results: Option<&'static str>,
}

const DEMO_EVALUATIONS: [DemoEvaluation; 4] = [
    DemoEvaluation {
        namespace: "project-1",
        name: "llama-eval-completed",
        display_name: "Llama Model Evaluation - Completed",
        age_hours: 2,
        model: "llama2-7b-chat",
        tasks: ["hellaswag", "arc_easy"],
        batch_size: "8",
        allow_code_execution: false,
        allow_online: true,
        results: Some(r#"{"results":{"hellaswag":{"acc,none":0.85,"acc_norm,none":0.75},"arc_easy":{"acc,none":0.82,"acc_norm,none":0.80}}}"#),
    },
    DemoEvaluation {
        namespace: "project-2",
        name: "mistral-eval-running",
        display_name: "Mistral 7B Benchmark - In Progress",
        age_hours: 1,
        model: "mistral-7b-instruct",
        tasks: ["mmlu", "gsm8k"],
        batch_size: "16",
        allow_code_execution: true,
        allow_online: false,
        results: None,
    },
    DemoEvaluation {
        namespace: "ds-project-3",
        name: "eval-1",
        display_name: "Evaluation 1",
        age_hours: 2,
        model: "llama2-7b-chat",
        tasks: ["hellaswag", "arc_easy"],
        batch_size: "8",
        allow_code_execution: false,
        allow_online: true,
        results: Some(r#"{"results":{"hellaswag":{"acc,none":0.87,"acc_norm,none":0.77},"arc_easy":{"acc,none":0.82,"acc_norm,none":0.80}}}"#),
    },
    DemoEvaluation {
        namespace: "ds-project-3",
        name: "eval-2",
        display_name: "Evaluation 2",
        age_hours: 1,
        model: "gpt-3.5-turbo",
        tasks: ["arc_easy", "mmlu"],
        batch_size: "16",
        allow_code_execution: false,
        allow_online: false,
        results: None,
    },
];

impl DemoEvaluation {
    fn to_resource<K: EvaluationKind>(&self) -> Evaluation<K> {
        let mut evaluation = Evaluation::<K>::new(self.namespace, self.name);
        evaluation
            .metadata
            .annotations
            .insert(DISPLAY_NAME_ANNOTATION.to_string(), self.display_name.to_string());
        evaluation.metadata.creation_timestamp = Some(Utc::now() - Duration::hours(self.age_hours));
        evaluation.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
        evaluation.metadata.resource_version = Some("1".to_string());
        evaluation.spec.model = self.model.to_string();
        evaluation.spec.task_list.task_names = self.tasks.iter().map(|t| t.to_string()).collect();
        evaluation.spec.batch_size = Some(self.batch_size.to_string());
        evaluation.spec.allow_code_execution = self.allow_code_execution;
        evaluation.spec.allow_online = self.allow_online;
        evaluation.status = Some(match self.results {
            Some(results) => EvaluationStatus {
                state: Some("Complete".to_string()),
                message: Some("Evaluation completed successfully".to_string()),
                results: Some(results.to_string()),
                ..Default::default()
            },
            None => EvaluationStatus {
                state: Some("Running".to_string()),
                message: Some("Evaluation in progress".to_string()),
                ..Default::default()
            },
        });
        evaluation
    }
}

fn demo_evaluations<K: EvaluationKind>() -> Vec<serde_json::Value> {
    DEMO_EVALUATIONS
        .iter()
        .filter_map(|demo| serde_json::to_value(demo.to_resource::<K>()).ok())
        .collect()
}

fn demo_namespace(name: &str, display_name: &str, description: &str) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            annotations: Some(BTreeMap::from([
                ("openshift.io/display-name".to_string(), display_name.to_string()),
                ("openshift.io/description".to_string(), description.to_string()),
            ])),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn details(
    name: &str,
    display_name: &str,
    description: &str,
    ip: &str,
    port: i32,
) -> ServiceDetails {
    ServiceDetails {
        name: name.to_string(),
        display_name: display_name.to_string(),
        description: description.to_string(),
        cluster_ip: ip.to_string(),
        http_port: port,
    }
}

#[async_trait]
impl KubernetesClient for MockClient {
    async fn get_namespaces(
        &self,
        identity: &RequestIdentity,
    ) -> Result<Vec<Namespace>, KubeError> {
        if identity.user_id().is_none() {
            return Ok(Vec::new());
        }
        Ok(vec![
            demo_namespace("project-1", "Project 1", "First test project"),
            demo_namespace("project-2", "Project 2", "Second test project"),
            demo_namespace(
                "ds-project-3",
                "Data Science Project",
                "Data science project with model evaluations",
            ),
        ])
    }

    async fn can_list_services_in_namespace(
        &self,
        _identity: &RequestIdentity,
        _namespace: &str,
    ) -> Result<bool, KubeError> {
        Ok(true)
    }

    async fn can_access_service_in_namespace(
        &self,
        _identity: &RequestIdentity,
        _namespace: &str,
        _service_name: &str,
    ) -> Result<bool, KubeError> {
        Ok(true)
    }

    async fn is_cluster_admin(&self, identity: &RequestIdentity) -> Result<bool, KubeError> {
        Ok(identity.user_id() == Some(MOCK_ADMIN_USER))
    }

    async fn get_user(&self, identity: &RequestIdentity) -> Result<String, KubeError> {
        Ok(identity.user_id().unwrap_or("mock-user").to_string())
    }

    async fn get_service_details(
        &self,
        _namespace: &str,
    ) -> Result<Vec<ServiceDetails>, KubeError> {
        Ok(vec![
            details(
                "trustyai-service",
                "TrustyAI Service",
                "Mock TrustyAI service for development",
                "10.0.0.1",
                8080,
            ),
            details(
                "model-registry-service",
                "Model Registry Service",
                "Mock model registry service for development",
                "10.0.0.2",
                8081,
            ),
        ])
    }

    async fn get_service_details_by_name(
        &self,
        _namespace: &str,
        service_name: &str,
    ) -> Result<ServiceDetails, KubeError> {
        Ok(details(
            service_name,
            service_name,
            "Mock service for development",
            "10.0.0.1",
            8080,
        ))
    }

    async fn get_model_serving_services(
        &self,
        namespace: &str,
    ) -> Result<Vec<ServiceDetails>, KubeError> {
        let services = match namespace {
            "" => return Err(KubeError::InvalidInput("namespace cannot be empty".to_string())),
            "project-1" => vec![details(
                "llama2-7b-service",
                "Llama 2 7B Chat Model",
                "Model serving service for Llama 2 7B Chat",
                "10.1.0.10",
                8080,
            )],
            "project-2" => vec![details(
                "gpt-3.5-proxy",
                "GPT-3.5 Turbo Proxy",
                "OpenAI GPT-3.5 proxy service",
                "10.1.0.20",
                8080,
            )],
            "ds-project-3" => vec![
                details(
                    "model-registry",
                    "Model Registry",
                    "Centralized model registry service",
                    "10.1.0.30",
                    8080,
                ),
                details(
                    "triton-inference-server",
                    "NVIDIA Triton Server",
                    "High-performance inference server",
                    "10.1.0.31",
                    8000,
                ),
            ],
            "default" => vec![details(
                "ollama-service",
                "Ollama Local Models",
                "Local Ollama model serving",
                "10.1.0.40",
                11434,
            )],
            _ => Vec::new(),
        };
        Ok(services)
    }

    async fn create_lm_eval(
        &self,
        identity: &RequestIdentity,
        namespace: &str,
        resource: &LmEval,
    ) -> Result<LmEval, KubeError> {
        self.create(identity, namespace, resource).await
    }

    async fn get_lm_eval(
        &self,
        _identity: &RequestIdentity,
        namespace: &str,
        name: &str,
    ) -> Result<LmEval, KubeError> {
        self.get(namespace, name).await
    }

    async fn list_lm_evals(
        &self,
        _identity: &RequestIdentity,
        namespace: &str,
    ) -> Result<LmEvalList, KubeError> {
        self.list(namespace).await
    }

    async fn delete_lm_eval(
        &self,
        identity: &RequestIdentity,
        namespace: &str,
        name: &str,
    ) -> Result<(), KubeError> {
        self.delete::<LmEvalKind>(identity, namespace, name).await
    }

    async fn create_lm_eval_job(
        &self,
        identity: &RequestIdentity,
        namespace: &str,
        resource: &LmEvalJob,
    ) -> Result<LmEvalJob, KubeError> {
        self.create(identity, namespace, resource).await
    }

    async fn get_lm_eval_job(
        &self,
        _identity: &RequestIdentity,
        namespace: &str,
        name: &str,
    ) -> Result<LmEvalJob, KubeError> {
        self.get(namespace, name).await
    }

    async fn list_lm_eval_jobs(
        &self,
        _identity: &RequestIdentity,
        namespace: &str,
    ) -> Result<LmEvalJobList, KubeError> {
        self.list(namespace).await
    }

    async fn delete_lm_eval_job(
        &self,
        identity: &RequestIdentity,
        namespace: &str,
        name: &str,
    ) -> Result<(), KubeError> {
        self.delete::<LmEvalJobKind>(identity, namespace, name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> RequestIdentity {
        RequestIdentity::from_user_id("user@example.com")
    }

    fn job(name: &str) -> LmEvalJob {
        let mut job = LmEvalJob::new("", name);
        job.spec.model = "local-completions".to_string();
        job.spec.task_list.task_names = vec!["hellaswag".to_string()];
        job
    }

    #[tokio::test]
    async fn test_list_all_namespaces_preserves_order() {
        let client = MockClient::new();
        let list = client.list_lm_eval_jobs(&identity(), "").await.unwrap();

        let names: Vec<_> = list.items.iter().map(|i| i.metadata.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["llama-eval-completed", "mistral-eval-running", "eval-1", "eval-2"]
        );
        assert_eq!(list.kind, "LMEvalJobList");
        assert!(list.items.iter().all(|i| i.kind == "LMEvalJob"));
    }

    #[tokio::test]
    async fn test_list_skips_malformed_items() {
        let client = MockClient::new();
        client
            .store
            .write()
            .await
            .entry(LmEvalJobKind::DESCRIPTOR.plural)
            .or_default()
            .push(serde_json::json!({
                "apiVersion": "trustyai.opendatahub.io/v1alpha1",
                "kind": "LMEvalJob",
                "metadata": {"name": "broken", "namespace": "project-1"},
                "spec": {"model": 5}
            }));

        let list = client.list_lm_eval_jobs(&identity(), "").await.unwrap();
        assert_eq!(list.items.len(), 4);
        assert!(list.items.iter().all(|i| i.metadata.name != "broken"));
    }

    #[tokio::test]
    async fn test_list_filters_by_namespace() {
        let client = MockClient::new();
        let list = client.list_lm_evals(&identity(), "ds-project-3").await.unwrap();

        let names: Vec<_> = list.items.iter().map(|i| i.metadata.name.as_str()).collect();
        assert_eq!(names, vec!["eval-1", "eval-2"]);
        assert_eq!(list.items[0].kind, "LMEval");
    }

    #[tokio::test]
    async fn test_create_get_delete_cycle() {
        let client = MockClient::empty();
        let created = client
            .create_lm_eval_job(&identity(), "ns1", &job("my-eval"))
            .await
            .unwrap();
        assert_eq!(created.metadata.namespace, "ns1");
        assert!(created.metadata.uid.is_some());
        assert_eq!(
            created.status.as_ref().and_then(|s| s.state.as_deref()),
            Some("Pending")
        );

        let fetched = client.get_lm_eval_job(&identity(), "ns1", "my-eval").await.unwrap();
        assert_eq!(fetched, created);

        let duplicate = client
            .create_lm_eval_job(&identity(), "ns1", &job("my-eval"))
            .await;
        assert!(matches!(duplicate, Err(KubeError::Conflict(_))));

        client
            .delete_lm_eval_job(&identity(), "ns1", "my-eval")
            .await
            .unwrap();
        let gone = client.get_lm_eval_job(&identity(), "ns1", "my-eval").await;
        assert!(matches!(gone, Err(KubeError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let client = MockClient::new();
        let result = client.delete_lm_eval_job(&identity(), "ns1", "nope").await;
        assert!(matches!(result, Err(KubeError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_create_validates_locally() {
        let client = MockClient::empty();
        let result = client
            .create_lm_eval_job(&identity(), "ns1", &job("Bad_Name"))
            .await;
        assert!(matches!(result, Err(KubeError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_identity_dependent_answers() {
        let client = MockClient::new();
        let admin = RequestIdentity::from_user_id(MOCK_ADMIN_USER);

        assert!(client.is_cluster_admin(&admin).await.unwrap());
        assert!(!client.is_cluster_admin(&identity()).await.unwrap());
        assert_eq!(client.get_namespaces(&identity()).await.unwrap().len(), 3);
        assert!(client
            .get_namespaces(&RequestIdentity::default())
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            client.get_user(&RequestIdentity::default()).await.unwrap(),
            "mock-user"
        );
    }

    #[tokio::test]
    async fn test_service_names_come_from_details() {
        let client = MockClient::new();
        let names = client.get_service_names("project-1").await.unwrap();
        assert_eq!(names, vec!["trustyai-service", "model-registry-service"]);

        let services = client.get_model_serving_services("ds-project-3").await.unwrap();
        assert_eq!(services.len(), 2);
        assert!(client
            .get_model_serving_services("unknown")
            .await
            .unwrap()
            .is_empty());
    }
}
