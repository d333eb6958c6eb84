use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::server::error::ServerError;
use crate::server::middleware::RequestMeta;
use crate::server::state::AppState;

/// Resolve the caller identity for the configured auth method and store it in
/// request extensions for handlers.
///
/// Runs as a route layer on `/api/v1`, so it rejects requests before any
/// cluster call is attempted. Credential values are never logged.
pub async fn inject_identity(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let factory = &state.client_factory;

    let identity = match factory.extract_request_identity(req.headers()) {
        Ok(identity) => identity,
        Err(e) => {
            tracing::debug!(
                method = %factory.method(),
                path = %req.uri().path(),
                "Failed to extract request identity: {}",
                e
            );
            return ServerError::from(e).into_response();
        }
    };

    if let Err(e) = factory.validate_request_identity(Some(&identity)) {
        tracing::debug!(
            method = %factory.method(),
            path = %req.uri().path(),
            "Rejected request identity: {}",
            e
        );
        return ServerError::from(e).into_response();
    }

    let token_length = identity.token().map(|t| t.expose().len()).unwrap_or(0);
    req.extensions_mut().insert(identity);

    let meta = RequestMeta::from_request(&req);
    tracing::debug!(?meta, token_length, "Resolved request identity");

    next.run(req).await
}
