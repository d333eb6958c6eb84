use kube::core::{ApiResource, GroupVersionKind};

/// API group served by the TrustyAI operator
pub const EVALUATION_GROUP: &str = "trustyai.opendatahub.io";
pub const EVALUATION_VERSION: &str = "v1alpha1";

/// Everything needed to address one custom resource kind through the dynamic API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceKind {
    pub group: &'static str,
    pub version: &'static str,
    pub kind: &'static str,
    pub plural: &'static str,
    /// Whether `metadata.name` is checked locally before create
    pub validate_name: bool,
}

impl ResourceKind {
    pub fn api_version(&self) -> String {
        format!("{}/{}", self.group, self.version)
    }

    pub fn list_kind(&self) -> String {
        format!("{}List", self.kind)
    }

    pub fn api_resource(&self) -> ApiResource {
        let gvk = GroupVersionKind::gvk(self.group, self.version, self.kind);
        ApiResource::from_gvk_with_plural(&gvk, self.plural)
    }
}

/// Type-level tag selecting the evaluation resource kind.
pub trait EvaluationKind:
    std::fmt::Debug + Clone + Default + PartialEq + Send + Sync + 'static
{
    const DESCRIPTOR: ResourceKind;
}

/// Legacy `LMEval` resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LmEvalKind;

impl EvaluationKind for LmEvalKind {
    // Names are not checked locally for this kind; only LMEvalJob enforces the format.
    const DESCRIPTOR: ResourceKind = ResourceKind {
        group: EVALUATION_GROUP,
        version: EVALUATION_VERSION,
        kind: "LMEval",
        plural: "lmevals",
        validate_name: false,
    };
}

/// Current `LMEvalJob` resource, the one created through the HTTP API
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LmEvalJobKind;

impl EvaluationKind for LmEvalJobKind {
    const DESCRIPTOR: ResourceKind = ResourceKind {
        group: EVALUATION_GROUP,
        version: EVALUATION_VERSION,
        kind: "LMEvalJob",
        plural: "lmevaljobs",
        validate_name: true,
    };
}

/// Check a name against the DNS-subdomain-like subset accepted for evaluation jobs:
/// 1 to 253 characters of `[a-z0-9-]`, not starting or ending with `-`.
pub fn is_valid_kubernetes_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 253 {
        return false;
    }
    if name.starts_with('-') || name.ends_with('-') {
        return false;
    }
    name.chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}
