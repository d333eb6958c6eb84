use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use tracing::instrument;

use super::mapping::build_job;
use super::models::{CreateEvaluationRequest, NamespaceQuery};
use crate::server::auth::RequestIdentity;
use crate::server::error::ServerError;
use crate::server::response::Envelope;
use crate::server::state::AppState;

fn require_identity(
    identity: Option<Extension<RequestIdentity>>,
) -> Result<RequestIdentity, ServerError> {
    identity
        .map(|Extension(identity)| identity)
        .ok_or_else(|| ServerError::bad_request("missing request identity"))
}

fn require_namespace(query: &NamespaceQuery) -> Result<&str, ServerError> {
    query
        .namespace()
        .ok_or_else(|| ServerError::bad_request("namespace parameter is required"))
}

/// List evaluation jobs, across all visible namespaces unless `?namespace=` is given
#[instrument(skip(state, identity, query))]
pub async fn list_evaluations(
    State(state): State<AppState>,
    identity: Option<Extension<RequestIdentity>>,
    query: Result<Query<NamespaceQuery>, QueryRejection>,
) -> Result<Response, ServerError> {
    let identity = require_identity(identity)?;
    let Query(query) = query?;
    let namespace = query.namespace().unwrap_or("");

    let client = state.client_factory.get_client(Some(&identity))?;
    let jobs = client
        .list_lm_eval_jobs(&identity, namespace)
        .await
        .map_err(|e| {
            ServerError::from_kube(e, "failed to list LMEvalJobs")
                .with_context("namespace", namespace)
        })?;

    tracing::debug!(
        "Listed {} LMEvalJobs in namespace '{}'",
        jobs.items.len(),
        namespace
    );
    Ok(Envelope::ok(jobs))
}

#[instrument(skip(state, identity, query, body))]
pub async fn create_evaluation(
    State(state): State<AppState>,
    identity: Option<Extension<RequestIdentity>>,
    query: Result<Query<NamespaceQuery>, QueryRejection>,
    body: Result<Json<CreateEvaluationRequest>, JsonRejection>,
) -> Result<Response, ServerError> {
    let identity = require_identity(identity)?;
    let Query(query) = query?;
    let namespace = require_namespace(&query)?;
    let Json(request) = body?;

    if request.evaluation_name.is_empty() {
        return Err(ServerError::bad_request("evaluationName is required"));
    }
    if request.model_type.is_empty() {
        return Err(ServerError::bad_request("modelType is required"));
    }
    if request.tasks.is_empty() {
        return Err(ServerError::bad_request("at least one task is required"));
    }

    let client = state.client_factory.get_client(Some(&identity))?;

    let job = build_job(&request, namespace);
    let created = client
        .create_lm_eval_job(&identity, namespace, &job)
        .await
        .map_err(|e| {
            ServerError::from_kube(e, "failed to create LMEvalJob")
                .with_context("namespace", namespace)
                .with_context("name", job.metadata.name.clone())
        })?;

    tracing::info!(
        "Created LMEvalJob {}/{} ({})",
        namespace,
        created.metadata.name,
        created.display_name()
    );
    Ok(Envelope::created(created))
}

#[instrument(skip(state, identity, query))]
pub async fn get_evaluation(
    State(state): State<AppState>,
    identity: Option<Extension<RequestIdentity>>,
    Path(name): Path<String>,
    query: Result<Query<NamespaceQuery>, QueryRejection>,
) -> Result<Response, ServerError> {
    let identity = require_identity(identity)?;
    if name.is_empty() {
        return Err(ServerError::bad_request("evaluation name is required"));
    }
    let Query(query) = query?;
    let namespace = require_namespace(&query)?;

    let client = state.client_factory.get_client(Some(&identity))?;
    let job = client
        .get_lm_eval_job(&identity, namespace, &name)
        .await
        .map_err(|e| {
            ServerError::from_kube(e, "failed to get LMEvalJob")
                .with_context("namespace", namespace)
                .with_context("name", name.clone())
        })?;

    Ok(Envelope::ok(job))
}

#[instrument(skip(state, identity, query))]
pub async fn delete_evaluation(
    State(state): State<AppState>,
    identity: Option<Extension<RequestIdentity>>,
    Path(name): Path<String>,
    query: Result<Query<NamespaceQuery>, QueryRejection>,
) -> Result<Response, ServerError> {
    let identity = require_identity(identity)?;
    if name.is_empty() {
        return Err(ServerError::bad_request("evaluation name is required"));
    }
    let Query(query) = query?;
    let namespace = require_namespace(&query)?;

    let client = state.client_factory.get_client(Some(&identity))?;
    client
        .delete_lm_eval_job(&identity, namespace, &name)
        .await
        .map_err(|e| {
            ServerError::from_kube(e, "failed to delete LMEvalJob")
                .with_context("namespace", namespace)
                .with_context("name", name.clone())
        })?;

    tracing::info!("Deleted LMEvalJob {}/{}", namespace, name);
    Ok(StatusCode::NO_CONTENT.into_response())
}
