use k8s_openapi::api::core::v1::Namespace;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamespaceModel {
    pub name: String,
}

impl NamespaceModel {
    /// `None` for a namespace object without a name
    pub fn from_namespace(namespace: &Namespace) -> Option<Self> {
        namespace
            .metadata
            .name
            .as_ref()
            .filter(|name| !name.is_empty())
            .map(|name| Self { name: name.clone() })
    }
}
