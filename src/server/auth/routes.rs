use axum::{routing::get, Router};

use super::handlers;
use crate::server::state::AppState;

/// Identity routes; mounted under `/api/v1` behind the identity middleware
pub fn routes() -> Router<AppState> {
    Router::new().route("/user", get(handlers::current_user))
}
