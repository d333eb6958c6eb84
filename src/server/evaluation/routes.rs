use axum::{routing::get, Router};

use super::handlers;
use crate::server::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/evaluations",
            get(handlers::list_evaluations).post(handlers::create_evaluation),
        )
        .route(
            "/evaluations/{name}",
            get(handlers::get_evaluation).delete(handlers::delete_evaluation),
        )
}
