//! Administrative JSON API over [`Engine`].
//!
//! Writes take the acting identity from the `x-livguard-actor` header.
//! Errors are returned as `{"code": .., "message": ..}` with the stable
//! reason code.

use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use livguard_core::error::{LivGuardError, ReasonCode};
use livguard_core::event::EventQuery;
use livguard_core::policy::Policy;

use crate::engine::Engine;
use crate::templates::TemplateValue;

pub const ACTOR_HEADER: &str = "x-livguard-actor";
const DEFAULT_ACTOR: &str = "ops";

pub struct ApiError(pub LivGuardError);

impl From<LivGuardError> for ApiError {
    fn from(e: LivGuardError) -> Self {
        Self(e)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ReasonCode,
    pub message: String,
}

pub fn status_for(e: &LivGuardError) -> StatusCode {
    match e {
        LivGuardError::NotFound(_) | LivGuardError::UnknownTemplate(_) => StatusCode::NOT_FOUND,
        LivGuardError::Conflict(_)
        | LivGuardError::VersionConflict { .. }
        | LivGuardError::PolicyInUse(_)
        | LivGuardError::InvalidState { .. } => StatusCode::CONFLICT,
        LivGuardError::PermissionDenied { .. } | LivGuardError::ModuleRejected { .. } => {
            StatusCode::FORBIDDEN
        }
        LivGuardError::LogUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        LivGuardError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!(code = self.0.reason_code().as_str(), error = %self.0, "api request failed");
        }
        let body = ErrorBody {
            code: self.0.reason_code(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

fn actor(headers: &HeaderMap) -> String {
    headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_ACTOR)
        .to_string()
}

pub async fn list_policies(State(engine): State<Engine>) -> Json<Vec<Policy>> {
    Json(engine.list_policies().iter().map(|p| (**p).clone()).collect())
}

pub async fn create_policy(
    State(engine): State<Engine>,
    headers: HeaderMap,
    Json(policy): Json<Policy>,
) -> ApiResult<(StatusCode, Json<Policy>)> {
    let created = engine.create_policy(policy, &actor(&headers))?;
    Ok((StatusCode::CREATED, Json((*created).clone())))
}

pub async fn get_policy(
    State(engine): State<Engine>,
    Path(id): Path<String>,
) -> ApiResult<Json<Policy>> {
    Ok(Json((*engine.get_policy(&id)?).clone()))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateBody {
    pub expected_version: u64,
    pub policy: Policy,
}

/// Replace the settings of `id`. Identity and bookkeeping fields in the body
/// are ignored.
pub async fn update_policy(
    State(engine): State<Engine>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<UpdateBody>,
) -> ApiResult<Json<Policy>> {
    let replacement = body.policy;
    let updated = engine.update_policy(
        &id,
        body.expected_version,
        move |p| *p = replacement,
        &actor(&headers),
    )?;
    Ok(Json((*updated).clone()))
}

pub async fn delete_policy(
    State(engine): State<Engine>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    engine.delete_policy(&id, &actor(&headers))?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn policy_history(
    State(engine): State<Engine>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Policy>>> {
    let versions = engine.policy_history(&id)?;
    Ok(Json(versions.iter().map(|p| (**p).clone()).collect()))
}

pub async fn effective_policy(State(engine): State<Engine>, Path(id): Path<String>) -> Response {
    match engine.resolve(&id) {
        Ok(eff) => Json(eff.as_ref().clone()).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstantiateBody {
    pub policy_id: String,
    #[serde(default)]
    pub variables: BTreeMap<String, TemplateValue>,
}

pub async fn list_templates(State(engine): State<Engine>) -> Json<Vec<String>> {
    Json(engine.templates().ids().into_iter().map(String::from).collect())
}

pub async fn instantiate_template(
    State(engine): State<Engine>,
    Path(template_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<InstantiateBody>,
) -> ApiResult<(StatusCode, Json<Policy>)> {
    let created = engine.create_from_template(
        &template_id,
        &body.policy_id,
        &body.variables,
        &actor(&headers),
    )?;
    Ok((StatusCode::CREATED, Json((*created).clone())))
}

pub async fn validate(State(engine): State<Engine>) -> Response {
    Json(engine.validate_system()).into_response()
}

pub async fn security_metrics(State(engine): State<Engine>) -> Response {
    match engine.security_metrics() {
        Ok(m) => Json(m).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

pub async fn events(State(engine): State<Engine>, Query(q): Query<EventQuery>) -> Response {
    match engine.query_events(&q) {
        Ok(events) => Json(events).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct StatsParams {
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
}

pub async fn event_stats(State(engine): State<Engine>, Query(p): Query<StatsParams>) -> Response {
    match engine.event_statistics(p.since, p.until) {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

pub async fn sandboxes(State(engine): State<Engine>) -> Response {
    Json(engine.list_sandboxes()).into_response()
}

pub async fn quarantined(State(engine): State<Engine>) -> Response {
    Json(engine.quarantined()).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReleaseBody {
    #[serde(default)]
    pub notes: String,
}

pub async fn release_quarantine(
    State(engine): State<Engine>,
    Path(document_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<ReleaseBody>,
) -> ApiResult<Response> {
    let release = engine.release_document(&document_id, &actor(&headers), &body.notes)?;
    Ok(Json(release).into_response())
}
