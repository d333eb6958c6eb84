use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::marker::PhantomData;

use crate::server::kubernetes::error::KubeError;
use crate::server::kubernetes::resource::{
    is_valid_kubernetes_name, EvaluationKind, LmEvalJobKind, LmEvalKind,
};

/// Annotation holding the human readable evaluation name
pub const DISPLAY_NAME_ANNOTATION: &str = "opendatahub.io/display-name";

/// An evaluation custom resource. `K` selects the kind (`LMEval` or `LMEvalJob`);
/// both kinds share the same shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", bound = "")]
pub struct Evaluation<K: EvaluationKind> {
    pub api_version: String,
    pub kind: String,
    pub metadata: EvaluationMetadata,
    pub spec: EvaluationSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<EvaluationStatus>,
    #[serde(skip)]
    _kind: PhantomData<K>,
}

pub type LmEval = Evaluation<LmEvalKind>;
pub type LmEvalJob = Evaluation<LmEvalJobKind>;
pub type LmEvalList = EvaluationList<LmEvalKind>;
pub type LmEvalJobList = EvaluationList<LmEvalJobKind>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationMetadata {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationSpec {
    #[serde(default)]
    pub allow_code_execution: bool,
    #[serde(default)]
    pub allow_online: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<String>,
    #[serde(default)]
    pub log_samples: bool,
    #[serde(default)]
    pub model: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub model_args: Vec<ModelArg>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i64>,
    #[serde(default)]
    pub task_list: TaskList,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Outputs>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelArg {
    pub name: String,
    pub value: String,
}

impl ModelArg {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskList {
    #[serde(default)]
    pub task_names: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outputs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pvc_managed: Option<PvcManaged>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PvcManaged {
    pub size: String,
}

/// Populated by the operator; never written by this server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complete_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_schedule_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Raw results document as produced by the evaluation harness
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub progress_bars: Vec<ProgressBar>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressBar {
    #[serde(default)]
    pub count: String,
    #[serde(default)]
    pub elapsed_time: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub percent: String,
    #[serde(default)]
    pub remaining_time_estimate: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", bound = "")]
pub struct EvaluationList<K: EvaluationKind> {
    pub api_version: String,
    pub kind: String,
    pub metadata: ListMetadata,
    pub items: Vec<Evaluation<K>>,
}

impl<K: EvaluationKind> Evaluation<K> {
    /// Empty resource of kind `K` with its type tags filled in
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            api_version: K::DESCRIPTOR.api_version(),
            kind: K::DESCRIPTOR.kind.to_string(),
            metadata: EvaluationMetadata {
                name: name.into(),
                namespace: namespace.into(),
                ..Default::default()
            },
            spec: EvaluationSpec::default(),
            status: None,
            _kind: PhantomData,
        }
    }

    pub fn display_name(&self) -> &str {
        self.metadata
            .annotations
            .get(DISPLAY_NAME_ANNOTATION)
            .map(String::as_str)
            .unwrap_or(&self.metadata.name)
    }

    /// Local checks run before a create reaches the cluster.
    pub fn validate(&self) -> Result<(), KubeError> {
        let descriptor = K::DESCRIPTOR;

        if descriptor.validate_name {
            if self.metadata.name.is_empty() {
                return Err(KubeError::InvalidInput(format!(
                    "{} name is required",
                    descriptor.kind
                )));
            }
            if !is_valid_kubernetes_name(&self.metadata.name) {
                return Err(KubeError::InvalidInput(format!(
                    "invalid {} name '{}': must be at most 253 lowercase alphanumeric \
                     characters or '-', and must start and end with an alphanumeric character",
                    descriptor.kind, self.metadata.name
                )));
            }
        }
        if self.metadata.namespace.is_empty() {
            return Err(KubeError::InvalidInput(format!(
                "{} namespace is required",
                descriptor.kind
            )));
        }
        if self.spec.model.is_empty() {
            return Err(KubeError::InvalidInput(format!(
                "{} model is required",
                descriptor.kind
            )));
        }
        if self.spec.task_list.task_names.is_empty() {
            return Err(KubeError::InvalidInput(format!(
                "{} must have at least one task",
                descriptor.kind
            )));
        }

        Ok(())
    }
}

impl<K: EvaluationKind> EvaluationList<K> {
    pub fn new(items: Vec<Evaluation<K>>, resource_version: Option<String>) -> Self {
        Self {
            api_version: K::DESCRIPTOR.api_version(),
            kind: K::DESCRIPTOR.list_kind(),
            metadata: ListMetadata { resource_version },
            items,
        }
    }
}

/// Body of `POST /api/v1/evaluations`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEvaluationRequest {
    #[serde(default)]
    pub evaluation_name: String,
    #[serde(default)]
    pub k8s_name: String,
    #[serde(default)]
    pub model_type: String,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub tasks: Vec<String>,
    #[serde(default)]
    pub allow_remote_code: bool,
    #[serde(default)]
    pub allow_online: bool,
    #[serde(default)]
    pub batch_size: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub tokenized_request: String,
    #[serde(default)]
    pub tokenizer: String,
}

#[derive(Debug, Deserialize)]
pub struct NamespaceQuery {
    #[serde(default)]
    pub namespace: Option<String>,
}

impl NamespaceQuery {
    /// The namespace, treating an empty value as absent
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref().filter(|ns| !ns.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_job(name: &str) -> LmEvalJob {
        let mut job = LmEvalJob::new("ns1", name);
        job.spec.model = "local-completions".to_string();
        job.spec.task_list.task_names = vec!["hellaswag".to_string()];
        job
    }

    #[test]
    fn test_validate_accepts_complete_job() {
        valid_job("eval-1").validate().unwrap();
    }

    #[test]
    fn test_validate_requires_model_and_tasks() {
        let mut job = valid_job("eval-1");
        job.spec.model.clear();
        assert!(matches!(job.validate(), Err(KubeError::InvalidInput(_))));

        let mut job = valid_job("eval-1");
        job.spec.task_list.task_names.clear();
        assert!(matches!(job.validate(), Err(KubeError::InvalidInput(_))));
    }

    #[test]
    fn test_validate_checks_name_only_for_jobs() {
        assert!(matches!(
            valid_job("Eval_1").validate(),
            Err(KubeError::InvalidInput(_))
        ));

        let mut eval = LmEval::new("ns1", "Eval_1");
        eval.spec.model = "hf".to_string();
        eval.spec.task_list.task_names = vec!["mmlu".to_string()];
        eval.validate().unwrap();
    }

    #[test]
    fn test_serialization_uses_wire_names() {
        let mut job = valid_job("eval-1");
        job.spec.model_args = vec![ModelArg::new("model", "foo")];
        job.spec.outputs = Some(Outputs {
            pvc_managed: Some(PvcManaged {
                size: "100Mi".to_string(),
            }),
        });

        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["apiVersion"], "trustyai.opendatahub.io/v1alpha1");
        assert_eq!(value["kind"], "LMEvalJob");
        assert_eq!(value["spec"]["taskList"]["taskNames"][0], "hellaswag");
        assert_eq!(value["spec"]["outputs"]["pvcManaged"]["size"], "100Mi");
        assert!(value.get("status").is_none());
        assert!(value.get("_kind").is_none());
    }

    #[test]
    fn test_status_deserializes_from_operator_output() {
        let value = serde_json::json!({
            "apiVersion": "trustyai.opendatahub.io/v1alpha1",
            "kind": "LMEvalJob",
            "metadata": {"name": "eval-1", "namespace": "ns1", "uid": "abc"},
            "spec": {"model": "hf", "taskList": {"taskNames": ["arc_easy"]}},
            "status": {
                "state": "Running",
                "progressBars": [{"count": "1/2", "elapsedTime": "10s", "message": "loading",
                                  "percent": "50%", "remainingTimeEstimate": "10s"}]
            }
        });

        let job: LmEvalJob = serde_json::from_value(value).unwrap();
        let status = job.status.unwrap();
        assert_eq!(status.state.as_deref(), Some("Running"));
        assert_eq!(status.progress_bars[0].percent, "50%");
        assert_eq!(job.metadata.uid.as_deref(), Some("abc"));
    }

    #[test]
    fn test_display_name_falls_back_to_name() {
        let mut job = valid_job("eval-1");
        assert_eq!(job.display_name(), "eval-1");
        job.metadata
            .annotations
            .insert(DISPLAY_NAME_ANNOTATION.to_string(), "My Eval".to_string());
        assert_eq!(job.display_name(), "My Eval");
    }
}
