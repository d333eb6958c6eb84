use axum::{extract::State, response::Response, Extension};
use tracing::instrument;

use super::models::{fallback_models, ModelOption};
use crate::server::auth::RequestIdentity;
use crate::server::error::ServerError;
use crate::server::response::Envelope;
use crate::server::state::AppState;

/// Model servers discovered in every namespace the caller can see.
///
/// Namespaces whose Services cannot be listed are skipped with a warning. When
/// nothing is found the fixed list of hosted models is returned instead.
#[instrument(skip(state, identity))]
pub async fn list_models(
    State(state): State<AppState>,
    identity: Option<Extension<RequestIdentity>>,
) -> Result<Response, ServerError> {
    let Some(Extension(identity)) = identity else {
        return Err(ServerError::bad_request("missing request identity"));
    };

    let client = state.client_factory.get_client(Some(&identity))?;
    let namespaces = client
        .get_namespaces(&identity)
        .await
        .map_err(|e| ServerError::from_kube(e, "failed to get namespaces"))?;

    let mut options = Vec::new();
    for namespace in namespaces.iter().filter_map(|ns| ns.metadata.name.as_deref()) {
        match client.get_model_serving_services(namespace).await {
            Ok(services) => options.extend(
                services
                    .iter()
                    .map(|service| ModelOption::from_service(service, namespace)),
            ),
            Err(e) => {
                tracing::warn!(
                    namespace = %namespace,
                    "Failed to get model serving services in namespace: {}",
                    e
                );
            }
        }
    }

    if options.is_empty() {
        tracing::warn!("No model serving services found, providing fallback models");
        options = fallback_models();
    }

    Ok(Envelope::ok(options))
}
