use axum::{routing::get, Router};

use super::handlers;
use crate::server::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/namespaces", get(handlers::list_namespaces))
}
