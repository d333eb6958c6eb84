pub mod auth;
pub mod error;
pub mod evaluation;
pub mod frontend;
pub mod kubernetes;
pub mod middleware;
pub mod model;
pub mod namespace;
pub mod response;
pub mod settings;
pub mod state;

use anyhow::{Context, Result};
use axum::{
    http::{HeaderValue, Method},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use state::AppState;
use std::future::IntoFuture;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::server::error::ServerError;

/// Run the HTTP server until a shutdown signal arrives
pub async fn run_server(settings: settings::Settings) -> Result<()> {
    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let shutdown_timeout = Duration::from_secs(settings.server.shutdown_timeout_secs);

    let state = AppState::new_for_server(settings).await?;
    let app = build_router(state)?;

    info!("HTTP server listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    let shutdown = CancellationToken::new();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move {
                shutdown_signal().await;
                shutdown.cancel();
            }
        })
        .into_future();

    // In-flight requests get a bounded grace period once the signal arrives
    let deadline = async {
        shutdown.cancelled().await;
        tokio::time::sleep(shutdown_timeout).await;
    };

    tokio::select! {
        result = server => {
            result.context("HTTP server error")?;
            info!("HTTP server shutdown complete");
        }
        _ = deadline => {
            warn!(
                "In-flight requests still running after {}s, forcing shutdown",
                shutdown_timeout.as_secs()
            );
        }
    }

    Ok(())
}

/// Assemble the full application router
pub fn build_router(state: AppState) -> Result<Router> {
    // Everything under /api/v1 needs an identity
    let api_routes = Router::new()
        .merge(auth::routes::routes())
        .merge(namespace::routes::routes())
        .merge(evaluation::routes::routes())
        .merge(model::routes::routes())
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::middleware::inject_identity,
        ))
        .fallback(api_not_found);

    let mut app = Router::new()
        .route("/healthcheck", get(health_check))
        .nest("/api/v1", api_routes)
        .merge(frontend::routes::frontend_routes())
        .with_state(state.clone())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn(middleware::request_id_middleware)),
        );

    if let Some(cors) = cors_layer(&state.settings.server.allowed_origins)? {
        app = app.layer(cors);
    }

    Ok(app.layer(CatchPanicLayer::custom(middleware::panic_response)))
}

/// CORS for the configured origins; `None` when no origins are configured
fn cors_layer(allowed_origins: &[String]) -> Result<Option<CorsLayer>> {
    if allowed_origins.is_empty() {
        return Ok(None);
    }

    let allow_origin = if allowed_origins.iter().any(|origin| origin == "*") {
        AllowOrigin::any()
    } else {
        let origins = allowed_origins
            .iter()
            .map(|origin| {
                HeaderValue::from_str(origin)
                    .with_context(|| format!("Invalid allowed origin: {}", origin))
            })
            .collect::<Result<Vec<_>>>()?;
        AllowOrigin::list(origins)
    };

    info!("CORS enabled for origins: {}", allowed_origins.join(", "));
    Ok(Some(
        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers(Any),
    ))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthCheck {
    status: &'static str,
    system_info: SystemInfo,
    user_id: &'static str,
}

#[derive(Debug, Serialize)]
struct SystemInfo {
    version: &'static str,
}

async fn health_check() -> Json<HealthCheck> {
    Json(HealthCheck {
        status: "available",
        system_info: SystemInfo {
            version: env!("CARGO_PKG_VERSION"),
        },
        user_id: "id",
    })
}

async fn api_not_found() -> Response {
    ServerError::not_found("the requested resource could not be found").into_response()
}

/// Wait for a shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
