use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::server::auth::AuthError;
use crate::server::kubernetes::KubeError;

/// Server error type that provides automatic logging and clean error responses.
///
/// This type:
/// - Automatically logs errors when converted to HTTP responses (via IntoResponse)
/// - Preserves full error chains from anyhow::Error for debugging
/// - Allows attaching structured context (namespaces, resource names, etc.)
/// - Renders as `{"error": {"code": "<status>", "message": "..."}}`
///
/// # Example
///
/// ```rust,ignore
/// use crate::server::error::ServerError;
///
/// // Simple error with just a message
/// let err = ServerError::bad_request("namespace parameter is required");
///
/// // Cluster failure, status derived from the error kind
/// let job = client
///     .get_lm_eval_job(&identity, namespace, &name)
///     .await
///     .map_err(|e| ServerError::from_kube(e, "failed to get LMEvalJob"))?;
/// ```
#[derive(Debug)]
pub struct ServerError {
    /// HTTP status code to return
    pub status: StatusCode,
    /// User-facing error message (returned in response)
    pub message: String,
    /// Internal error with full chain (logged but not exposed to client)
    pub source: Option<anyhow::Error>,
    /// Structured context for logging (key-value pairs)
    pub context: Vec<(&'static str, String)>,
}

impl ServerError {
    /// Create a new error with just status and message (no source error)
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            source: None,
            context: Vec::new(),
        }
    }

    /// Create an error from an anyhow::Error with full error chain
    pub fn from_anyhow(
        source: anyhow::Error,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status,
            message: message.into(),
            source: Some(source),
            context: Vec::new(),
        }
    }

    /// Wrap a cluster failure, prefixing the message with what was being attempted.
    ///
    /// NotFound, Forbidden and Conflict keep their status; local validation failures
    /// become 400; everything else is a 500.
    pub fn from_kube(err: KubeError, action: &str) -> Self {
        let status = match &err {
            KubeError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            KubeError::NotFound(_) => StatusCode::NOT_FOUND,
            KubeError::Forbidden(_) => StatusCode::FORBIDDEN,
            KubeError::Conflict(_) => StatusCode::CONFLICT,
            KubeError::CrdNotFound(_)
            | KubeError::Deadline { .. }
            | KubeError::Conversion { .. }
            | KubeError::Api { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = format!("{}: {}", action, err);
        Self::from_anyhow(err.into(), status, message)
    }

    /// Add a context field for logging (chainable)
    pub fn with_context(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.context.push((key, value.into()));
        self
    }

    /// Create a 500 Internal Server Error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Create a 500 Internal Server Error from an anyhow::Error
    pub fn internal_anyhow(source: anyhow::Error, message: impl Into<String>) -> Self {
        Self::from_anyhow(source, StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Create a 400 Bad Request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// Create a 404 Not Found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        // Log server errors (5xx) with full context using structured fields
        if self.status.is_server_error() {
            // Log with structured fields to prevent log injection
            if let Some(source) = &self.source {
                tracing::error!(
                    status = self.status.as_u16(),
                    message = %self.message,
                    context = ?self.context,
                    error = ?source,
                    "Server error"
                );
            } else {
                tracing::error!(
                    status = self.status.as_u16(),
                    message = %self.message,
                    context = ?self.context,
                    "Server error"
                );
            }
        } else {
            tracing::debug!(
                status = self.status.as_u16(),
                message = %self.message,
                context = ?self.context,
                "Client error"
            );
        }

        let body = Json(json!({
            "error": {
                "code": self.status.as_u16().to_string(),
                "message": self.message,
            }
        }));

        (self.status, body).into_response()
    }
}

impl From<AuthError> for ServerError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Client(_) => {
                Self::internal_anyhow(err.into(), "failed to get Kubernetes client")
            }
            AuthError::MissingCredential(_)
            | AuthError::InvalidCredential(_)
            | AuthError::MissingIdentity
            | AuthError::InvalidIdentity(_) => Self::bad_request(err.to_string()),
        }
    }
}

impl From<JsonRejection> for ServerError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(format!("invalid request body: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for ServerError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(format!("invalid query string: {}", rejection.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn render(err: ServerError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_error_envelope_shape() {
        let (status, body) =
            render(ServerError::bad_request("namespace parameter is required")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "400");
        assert_eq!(body["error"]["message"], "namespace parameter is required");
    }

    #[tokio::test]
    async fn test_kube_errors_keep_status() {
        let cases = [
            (KubeError::NotFound("gone".into()), StatusCode::NOT_FOUND),
            (KubeError::Forbidden("denied".into()), StatusCode::FORBIDDEN),
            (KubeError::Conflict("exists".into()), StatusCode::CONFLICT),
            (KubeError::InvalidInput("bad".into()), StatusCode::BAD_REQUEST),
            (
                KubeError::Deadline {
                    operation: "list".into(),
                    seconds: 30,
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            let (status, body) =
                render(ServerError::from_kube(err, "failed to get LMEvalJob")).await;
            assert_eq!(status, expected);
            assert!(body["error"]["message"]
                .as_str()
                .unwrap()
                .starts_with("failed to get LMEvalJob: "));
        }
    }

    #[test]
    fn test_auth_errors_are_bad_requests() {
        let err: ServerError = AuthError::MissingCredential("Authorization".into()).into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        let err: ServerError = AuthError::MissingIdentity.into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        let err: ServerError = AuthError::Client("tls".into()).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
