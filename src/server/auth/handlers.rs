use axum::{extract::State, response::Response, Extension};
use serde::Serialize;
use tracing::instrument;

use crate::server::auth::RequestIdentity;
use crate::server::error::ServerError;
use crate::server::response::Envelope;
use crate::server::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub user_id: String,
    pub cluster_admin: bool,
}

/// Who the cluster thinks the caller is, and whether they administer it
#[instrument(skip(state, identity))]
pub async fn current_user(
    State(state): State<AppState>,
    identity: Option<Extension<RequestIdentity>>,
) -> Result<Response, ServerError> {
    let Some(Extension(identity)) = identity else {
        return Err(ServerError::bad_request("missing request identity"));
    };

    let client = state.client_factory.get_client(Some(&identity))?;

    let user_id = client
        .get_user(&identity)
        .await
        .map_err(|e| ServerError::from_kube(e, "failed to get user"))?;
    let cluster_admin = client
        .is_cluster_admin(&identity)
        .await
        .map_err(|e| ServerError::from_kube(e, "failed to check cluster admin"))?;

    tracing::debug!("GET /user: user_id={}, cluster_admin={}", user_id, cluster_admin);

    Ok(Envelope::ok(UserResponse {
        user_id,
        cluster_admin,
    }))
}
