use axum::{routing::get, Router};

use super::handlers;
use crate::server::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/models", get(handlers::list_models))
}
