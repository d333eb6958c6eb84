use k8s_openapi::api::core::v1::Service;
use serde::Serialize;
use std::collections::BTreeMap;

use super::error::KubeError;

/// Label selecting the generic (non model serving) Services exposed to the dashboard
pub const COMPONENT_LABEL_SELECTOR: &str = "component=trustyai-service";

/// Port names tried in order when looking for a model server's HTTP port
const HTTP_PORT_NAMES: [&str; 6] = ["http-api", "http", "web", "serving", "inference", "predict"];
/// Conventional HTTP port numbers, tried when no port carries a known name
const HTTP_PORT_NUMBERS: [i32; 5] = [80, 8080, 8000, 5000, 9000];

const SERVING_APP_LABELS: [&str; 6] = [
    "kserve",
    "modelmesh",
    "seldon",
    "mlflow",
    "torchserve",
    "triton",
];
const SERVING_SERVICE_NAMES: [&str; 9] = [
    "modelmesh-serving",
    "model-mesh",
    "model-registry-service",
    "model-registry",
    "odh-model-controller",
    "mlflow-server",
    "mlflow-tracking",
    "torchserve",
    "triton-inference-server",
];
const SERVING_ANNOTATIONS: [&str; 3] = [
    "serving.kubeflow.org/inferenceservice",
    "ai.openshift.io/model-serving",
    "opendatahub.io/model-serving",
];

/// Read-only projection of a cluster Service, recomputed on every call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDetails {
    pub name: String,
    pub display_name: String,
    pub description: String,
    #[serde(rename = "clusterIP")]
    pub cluster_ip: String,
    pub http_port: i32,
}

fn non_empty<'a>(map: Option<&'a BTreeMap<String, String>>, key: &str) -> Option<&'a str> {
    map.and_then(|m| m.get(key))
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}

/// Heuristic check for Services fronting a model server (KServe, ModelMesh, Seldon,
/// MLflow, TorchServe, Triton and friends).
pub fn is_model_serving_service(service: &Service) -> bool {
    let name = service.metadata.name.as_deref().unwrap_or_default();
    let labels = service.metadata.labels.as_ref();
    let annotations = service.metadata.annotations.as_ref();

    if non_empty(labels, "serving.kserve.io/inferenceservice").is_some()
        || non_empty(labels, "component") == Some("predictor")
        || non_empty(labels, "seldon-app").is_some()
    {
        return true;
    }

    if let Some(app) = non_empty(labels, "app") {
        if SERVING_APP_LABELS.contains(&app) {
            return true;
        }
    }

    if SERVING_SERVICE_NAMES.contains(&name) {
        return true;
    }

    if SERVING_ANNOTATIONS
        .iter()
        .any(|key| non_empty(annotations, key).is_some())
    {
        return true;
    }

    name.contains("model")
        && (name.contains("serve") || name.contains("infer") || name.contains("predict"))
}

fn cluster_ip(service: &Service) -> Option<String> {
    service
        .spec
        .as_ref()
        .and_then(|spec| spec.cluster_ip.clone())
        .filter(|ip| !ip.is_empty())
}

/// Pick the HTTP port of a model server: known port names first, then conventional
/// numbers, then whatever port is declared first.
fn select_http_port(service: &Service) -> Option<i32> {
    let ports = service.spec.as_ref().and_then(|s| s.ports.as_ref())?;

    for wanted in HTTP_PORT_NAMES {
        if let Some(port) = ports.iter().find(|p| p.name.as_deref() == Some(wanted)) {
            return Some(port.port);
        }
    }

    if let Some(port) = ports.iter().find(|p| HTTP_PORT_NUMBERS.contains(&p.port)) {
        return Some(port.port);
    }

    let first = ports.first()?;
    tracing::warn!(
        service = service.metadata.name.as_deref().unwrap_or_default(),
        port = first.port,
        "Using first available port for model serving service"
    );
    Some(first.port)
}

pub fn build_model_serving_service_details(service: &Service) -> Result<ServiceDetails, KubeError> {
    let name = service.metadata.name.clone().unwrap_or_default();
    let annotations = service.metadata.annotations.as_ref();

    let http_port = select_http_port(service).ok_or_else(|| {
        KubeError::InvalidInput(format!("service \"{}\" has no usable HTTP port", name))
    })?;
    let cluster_ip = cluster_ip(service)
        .ok_or_else(|| KubeError::InvalidInput(format!("service \"{}\" missing ClusterIP", name)))?;

    let display_name = non_empty(annotations, "opendatahub.io/display-name")
        .or_else(|| non_empty(annotations, "serving.kubeflow.org/display-name"))
        .unwrap_or(&name)
        .to_string();
    let description = non_empty(annotations, "opendatahub.io/description")
        .or_else(|| non_empty(annotations, "serving.kubeflow.org/description"))
        .unwrap_or("Model serving service")
        .to_string();

    Ok(ServiceDetails {
        name,
        display_name,
        description,
        cluster_ip,
        http_port,
    })
}

/// Details of a generic dashboard Service, which must expose a port named `http-api`.
pub fn build_service_details(service: &Service) -> Result<ServiceDetails, KubeError> {
    let name = service.metadata.name.clone().unwrap_or_default();
    let annotations = service.metadata.annotations.as_ref();

    let http_port = service
        .spec
        .as_ref()
        .and_then(|s| s.ports.as_ref())
        .and_then(|ports| ports.iter().find(|p| p.name.as_deref() == Some("http-api")))
        .map(|p| p.port)
        .ok_or_else(|| {
            KubeError::InvalidInput(format!(
                "service \"{}\" missing required 'http-api' port",
                name
            ))
        })?;
    let cluster_ip = cluster_ip(service)
        .ok_or_else(|| KubeError::InvalidInput(format!("service \"{}\" missing ClusterIP", name)))?;

    let display_name = non_empty(annotations, "displayName").unwrap_or_default().to_string();
    let description = non_empty(annotations, "description").unwrap_or_default().to_string();
    if display_name.is_empty() {
        tracing::warn!(service = %name, "Service missing displayName annotation");
    }
    if description.is_empty() {
        tracing::warn!(service = %name, "Service missing description annotation");
    }

    Ok(ServiceDetails {
        name,
        display_name,
        description,
        cluster_ip,
        http_port,
    })
}

/// Keep the model-serving Services of a listing, skipping unusable ones with a warning.
pub fn collect_model_serving_services(services: &[Service]) -> Vec<ServiceDetails> {
    services
        .iter()
        .filter(|svc| is_model_serving_service(svc))
        .filter_map(|svc| match build_model_serving_service_details(svc) {
            Ok(details) => Some(details),
            Err(e) => {
                tracing::warn!("Skipping model serving service: {}", e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{ServicePort, ServiceSpec};
    use kube::api::ObjectMeta;

    pub(crate) fn service(
        name: &str,
        labels: &[(&str, &str)],
        ports: &[(Option<&str>, i32)],
    ) -> Service {
        let to_map = |pairs: &[(&str, &str)]| {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>()
        };
        Service {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(to_map(labels)),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                cluster_ip: Some("10.0.0.1".to_string()),
                ports: Some(
                    ports
                        .iter()
                        .map(|(port_name, port)| ServicePort {
                            name: port_name.map(str::to_string),
                            port: *port,
                            ..Default::default()
                        })
                        .collect(),
                ),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_seldon_label_matches() {
        let svc = service("generic-svc", &[("app", "seldon")], &[(None, 9000)]);
        assert!(is_model_serving_service(&svc));
    }

    #[test]
    fn test_plain_service_does_not_match() {
        let svc = service("generic-svc", &[("app", "web")], &[(Some("http"), 80)]);
        assert!(!is_model_serving_service(&svc));
    }

    #[test]
    fn test_name_heuristics() {
        assert!(is_model_serving_service(&service("triton-inference-server", &[], &[])));
        assert!(is_model_serving_service(&service("my-model-predictor", &[], &[])));
        assert!(!is_model_serving_service(&service("model-store", &[], &[])));
    }

    #[test]
    fn test_annotation_marks_model_serving() {
        let mut svc = service("generic-svc", &[], &[]);
        svc.metadata.annotations = Some(BTreeMap::from([(
            "opendatahub.io/model-serving".to_string(),
            "true".to_string(),
        )]));
        assert!(is_model_serving_service(&svc));
    }

    #[test]
    fn test_port_name_priority_beats_numeric_fallback() {
        let svc = service(
            "llm",
            &[("component", "predictor")],
            &[(Some("grpc"), 8080), (Some("predict"), 9999), (Some("http"), 8888)],
        );
        let details = build_model_serving_service_details(&svc).unwrap();
        assert_eq!(details.http_port, 8888);
        assert_eq!(details.display_name, "llm");
        assert_eq!(details.description, "Model serving service");
    }

    #[test]
    fn test_numeric_then_first_port_fallback() {
        let svc = service("llm", &[], &[(Some("grpc"), 8033), (Some("metrics"), 8000)]);
        assert_eq!(build_model_serving_service_details(&svc).unwrap().http_port, 8000);

        let svc = service("llm", &[], &[(Some("grpc"), 8033)]);
        assert_eq!(build_model_serving_service_details(&svc).unwrap().http_port, 8033);

        let svc = service("llm", &[], &[]);
        assert!(build_model_serving_service_details(&svc).is_err());
    }

    #[test]
    fn test_generic_service_requires_http_api_port_and_cluster_ip() {
        let svc = service("trustyai-service", &[], &[(Some("http"), 80)]);
        assert!(build_service_details(&svc).is_err());

        let mut svc = service("trustyai-service", &[], &[(Some("http-api"), 8080)]);
        assert_eq!(build_service_details(&svc).unwrap().http_port, 8080);

        svc.spec.as_mut().unwrap().cluster_ip = Some(String::new());
        assert!(build_service_details(&svc).is_err());
    }

    #[test]
    fn test_collect_skips_unusable_services() {
        let services = vec![
            service("kserve-a", &[("app", "kserve")], &[(Some("http"), 8080)]),
            service("kserve-b", &[("app", "kserve")], &[]),
            service("frontend", &[], &[(Some("http"), 80)]),
        ];
        let found = collect_model_serving_services(&services);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "kserve-a");
    }
}
