//! Operational HTTP endpoints.
//!
//! - `/healthz` : liveness
//! - `/readyz`  : readiness (503 when draining)
//! - `/metrics` : Prometheus text format
//!
//! Administrative JSON endpoints live in [`api`].

pub mod api;

use axum::{http::StatusCode, response::{IntoResponse, Response}};

use crate::engine::Engine;

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub async fn readyz(axum::extract::State(engine): axum::extract::State<Engine>) -> impl IntoResponse {
    if engine.is_draining() {
        (StatusCode::SERVICE_UNAVAILABLE, "draining")
    } else {
        (StatusCode::OK, "ready")
    }
}

pub async fn metrics(axum::extract::State(engine): axum::extract::State<Engine>) -> Response {
    let extra = engine.metrics_extra();
    let body = engine.metrics().render(&extra);

    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
        .into_response()
}
