use serde::Serialize;

use crate::server::kubernetes::ServiceDetails;

/// A model the dashboard can offer for evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelOption {
    pub value: String,
    pub label: String,
    pub display_name: String,
    pub namespace: String,
    /// Base URL of the serving endpoint
    pub service: String,
}

impl ModelOption {
    /// Describe an in-cluster model server reachable through its Service DNS name
    pub fn from_service(service: &ServiceDetails, namespace: &str) -> Self {
        let display_name = if service.display_name.is_empty() {
            service.name.clone()
        } else {
            service.display_name.clone()
        };

        Self {
            value: format!("{}-{}", service.name, namespace),
            label: display_name.clone(),
            display_name,
            namespace: namespace.to_string(),
            service: format!(
                "http://{}.{}.svc.cluster.local:{}",
                service.name, namespace, service.http_port
            ),
        }
    }

    fn external(
        value: &str,
        label: &str,
        display_name: &str,
        namespace: &str,
        service: &str,
    ) -> Self {
        Self {
            value: value.to_string(),
            label: label.to_string(),
            display_name: display_name.to_string(),
            namespace: namespace.to_string(),
            service: service.to_string(),
        }
    }
}

/// Offered when discovery finds no model servers at all
pub fn fallback_models() -> Vec<ModelOption> {
    vec![
        ModelOption::external(
            "openai-gpt-3.5-turbo",
            "OpenAI GPT-3.5 Turbo",
            "OpenAI GPT-3.5 Turbo",
            "external",
            "https://api.openai.com/v1",
        ),
        ModelOption::external(
            "openai-gpt-4",
            "OpenAI GPT-4",
            "OpenAI GPT-4",
            "external",
            "https://api.openai.com/v1",
        ),
        ModelOption::external(
            "huggingface-llama2-7b",
            "Llama 2 7B Chat (HuggingFace)",
            "Llama 2 7B Chat",
            "external",
            "https://api-inference.huggingface.co/models/meta-llama/Llama-2-7b-chat-hf",
        ),
        ModelOption::external(
            "anthropic-claude-3-opus",
            "Anthropic Claude 3 Opus",
            "Claude 3 Opus",
            "external",
            "https://api.anthropic.com/v1",
        ),
        ModelOption::external(
            "local-ollama",
            "Local Ollama Service",
            "Local Ollama",
            "local",
            "http://localhost:11434/v1",
        ),
    ]
}
