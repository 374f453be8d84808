//! Axum router wiring for the ops and admin surface.

use axum::{routing::{get, post}, Router};

use crate::{engine::Engine, ops};

pub fn build_router(engine: Engine) -> Router {
    Router::new()
        .route("/healthz", get(ops::healthz))
        .route("/readyz", get(ops::readyz))
        .route("/metrics", get(ops::metrics))
        .route(
            "/v1/policies",
            get(ops::api::list_policies).post(ops::api::create_policy),
        )
        .route(
            "/v1/policies/:id",
            get(ops::api::get_policy)
                .put(ops::api::update_policy)
                .delete(ops::api::delete_policy),
        )
        .route("/v1/policies/:id/effective", get(ops::api::effective_policy))
        .route("/v1/policies/:id/history", get(ops::api::policy_history))
        .route("/v1/templates", get(ops::api::list_templates))
        .route(
            "/v1/templates/:id/instantiate",
            post(ops::api::instantiate_template),
        )
        .route("/v1/validate", get(ops::api::validate))
        .route("/v1/security-metrics", get(ops::api::security_metrics))
        .route("/v1/events", get(ops::api::events))
        .route("/v1/events/stats", get(ops::api::event_stats))
        .route("/v1/sandboxes", get(ops::api::sandboxes))
        .route("/v1/quarantine", get(ops::api::quarantined))
        .route(
            "/v1/quarantine/:document_id/release",
            post(ops::api::release_quarantine),
        )
        .with_state(engine)
}
