use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Success body wrapper: every API payload is returned as `{"data": ...}`.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub data: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(data: T) -> Response {
        (StatusCode::OK, Json(Envelope { data })).into_response()
    }

    pub fn created(data: T) -> Response {
        (StatusCode::CREATED, Json(Envelope { data })).into_response()
    }
}
