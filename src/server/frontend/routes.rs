use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::path::Path as FsPath;

use crate::server::error::ServerError;
use crate::server::state::AppState;

use super::StaticAssets;

pub fn frontend_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(serve_index))
        .route("/{*path}", get(serve_static))
}

async fn serve_index(State(state): State<AppState>) -> Response {
    let assets = StaticAssets::new(&state.settings.server.static_assets_dir);
    render_index(&assets).await
}

async fn serve_static(Path(path): Path<String>, State(state): State<AppState>) -> Response {
    let assets = StaticAssets::new(&state.settings.server.static_assets_dir);
    serve_file(&path, &assets).await
}

async fn render_index(assets: &StaticAssets) -> Response {
    let index = assets.index();
    match tokio::fs::read(&index).await {
        Ok(content) => file_response(&index, content),
        Err(e) => {
            tracing::warn!("index.html not found at {}: {}", index.display(), e);
            ServerError::not_found("not found").into_response()
        }
    }
}

async fn serve_file(path: &str, assets: &StaticAssets) -> Response {
    let path = path.trim_start_matches('/');

    if let Some(file) = assets.resolve(path).await {
        match tokio::fs::read(&file).await {
            Ok(content) => return file_response(&file, content),
            Err(e) => {
                tracing::warn!("Failed to read static file {}: {}", file.display(), e);
            }
        }
    }

    // API paths never fall back to the app shell
    if path == "api/v1" || path.starts_with("api/v1/") {
        return ServerError::not_found("not found").into_response();
    }

    // For all other routes, serve index.html (SPA fallback)
    render_index(assets).await
}

fn file_response(path: &FsPath, content: Vec<u8>) -> Response {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, mime.as_ref().to_string()),
            (header::CACHE_CONTROL, "public, max-age=3600".to_string()),
        ],
        Body::from(content),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::auth::factory::MockClientFactory;
    use crate::server::kubernetes::MockClient;
    use crate::server::settings::Settings;
    use axum::body::to_bytes;
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(static_dir: &FsPath) -> Router {
        let mut settings = Settings::default();
        settings.server.static_assets_dir = static_dir.display().to_string();
        let factory = Arc::new(MockClientFactory::new("kubeflow-userid", MockClient::new()));
        frontend_routes().with_state(AppState::with_factory(settings, factory))
    }

    async fn get_path(app: Router, uri: &str) -> (StatusCode, Option<String>, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, content_type, String::from_utf8(body.to_vec()).unwrap())
    }

    fn static_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html>app</html>").unwrap();
        std::fs::write(dir.path().join("main.css"), "body {}").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_serves_existing_file_with_mime_type() {
        let dir = static_dir();
        let (status, content_type, body) = get_path(app(dir.path()), "/main.css").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("text/css"));
        assert_eq!(body, "body {}");
    }

    #[tokio::test]
    async fn test_unknown_path_falls_back_to_index() {
        let dir = static_dir();
        let (status, content_type, body) =
            get_path(app(dir.path()), "/evaluations/my-eval").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("text/html"));
        assert_eq!(body, "<html>app</html>");

        let (status, _, body) = get_path(app(dir.path()), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "<html>app</html>");
    }

    #[tokio::test]
    async fn test_missing_index_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (status, _, _) = get_path(app(dir.path()), "/anything").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_api_paths_do_not_fall_back() {
        let dir = static_dir();
        let (status, _, body) = get_path(app(dir.path()), "/api/v1/unknown").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains("\"error\""));
    }
}
