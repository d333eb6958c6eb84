use axum::{extract::State, response::Response, Extension};
use tracing::instrument;

use super::models::NamespaceModel;
use crate::server::auth::RequestIdentity;
use crate::server::error::ServerError;
use crate::server::response::Envelope;
use crate::server::state::AppState;

/// Namespaces visible to the caller, as `[{"name": ...}]`
#[instrument(skip(state, identity))]
pub async fn list_namespaces(
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
        .map_err(|e| ServerError::from_kube(e, "failed to list namespaces"))?;

    let namespaces: Vec<NamespaceModel> = namespaces
        .iter()
        .filter_map(NamespaceModel::from_namespace)
        .collect();

    Ok(Envelope::ok(namespaces))
}
