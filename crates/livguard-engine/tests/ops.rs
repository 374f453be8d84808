//! Operational endpoints and the JSON API handlers.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use axum::body::to_bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use livguard_core::error::{LivGuardError, ReasonCode};
use livguard_core::policy::Policy;
use livguard_engine::ops;
use livguard_engine::ops::api::{self, status_for, ErrorBody, UpdateBody, ACTOR_HEADER};

use fixtures::{engine, Behavior};

async fn body_text(resp: Response) -> String {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn as_actor(name: &str) -> HeaderMap {
    let mut h = HeaderMap::new();
    h.insert(ACTOR_HEADER, HeaderValue::from_str(name).unwrap());
    h
}

#[tokio::test]
async fn readiness_follows_draining() {
    let (engine, _) = engine(Behavior::Complete);
    assert_eq!(ops::healthz().await.into_response().status(), StatusCode::OK);
    assert_eq!(
        ops::readyz(State(engine.clone())).await.into_response().status(),
        StatusCode::OK
    );

    engine.shutdown("system").await;
    let resp = ops::readyz(State(engine.clone())).await.into_response();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_text(resp).await, "draining");
}

#[tokio::test]
async fn metrics_include_engine_gauges() {
    let (engine, _) = engine(Behavior::Complete);
    let resp = ops::metrics(State(engine)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let ct = resp.headers().get(axum::http::header::CONTENT_TYPE).unwrap();
    assert!(ct.to_str().unwrap().starts_with("text/plain; version=0.0.4"));

    let text = body_text(resp).await;
    assert!(text.contains("livguard_policies 1"), "{text}");
    assert!(text.contains("livguard_sandboxes_live 0"));
    assert!(text.contains("livguard_draining 0"));
}

#[tokio::test]
async fn errors_carry_reason_codes() {
    let (engine, _) = engine(Behavior::Complete);
    let resp = api::get_policy(State(engine), Path("missing".into()))
        .await
        .into_response();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let body: ErrorBody = serde_json::from_str(&body_text(resp).await).unwrap();
    assert_eq!(body.code, ReasonCode::NotFound);
    assert!(body.message.contains("missing"));
}

#[test]
fn status_mapping() {
    let cases = [
        (LivGuardError::NotFound("x".into()), StatusCode::NOT_FOUND),
        (
            LivGuardError::VersionConflict { id: "x".into(), expected: 1, found: 2 },
            StatusCode::CONFLICT,
        ),
        (LivGuardError::PolicyInUse("x".into()), StatusCode::CONFLICT),
        (LivGuardError::LogUnavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
        (LivGuardError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
        (LivGuardError::InvalidPolicy("x".into()), StatusCode::BAD_REQUEST),
        (LivGuardError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
    ];
    for (err, status) in cases {
        assert_eq!(status_for(&err), status, "{err}");
    }
}

#[tokio::test]
async fn policy_lifecycle_over_the_api() {
    let (engine, _) = engine(Behavior::Complete);

    let (status, Json(created)) = api::create_policy(
        State(engine.clone()),
        as_actor("alice"),
        Json(Policy::new("docs", "Docs").with_parent("default")),
    )
    .await
    .unwrap_or_else(|e| panic!("create failed: {}", e.0));
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created.version, 1);
    assert_eq!(created.created_by, "alice");

    let mut replacement = created.clone();
    replacement.name = "Documents".into();
    let Json(updated) = api::update_policy(
        State(engine.clone()),
        Path("docs".into()),
        HeaderMap::new(),
        Json(UpdateBody { expected_version: 1, policy: replacement.clone() }),
    )
    .await
    .unwrap_or_else(|e| panic!("update failed: {}", e.0));
    assert_eq!(updated.version, 2);
    assert_eq!(updated.name, "Documents");

    let stale = api::update_policy(
        State(engine.clone()),
        Path("docs".into()),
        HeaderMap::new(),
        Json(UpdateBody { expected_version: 1, policy: replacement }),
    )
    .await
    .into_response();
    assert_eq!(stale.status(), StatusCode::CONFLICT);

    let in_use = api::delete_policy(State(engine.clone()), Path("default".into()), HeaderMap::new())
        .await
        .into_response();
    assert_eq!(in_use.status(), StatusCode::CONFLICT);

    let gone = api::delete_policy(State(engine.clone()), Path("docs".into()), as_actor("bob"))
        .await
        .into_response();
    assert_eq!(gone.status(), StatusCode::NO_CONTENT);

    let events = engine.query_events(&Default::default()).unwrap();
    let last = events.last().unwrap();
    assert_eq!(last.actor, "bob");
}
