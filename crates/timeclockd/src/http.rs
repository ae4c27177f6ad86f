//! HTTP surface of the daemon.
//!
//! The check endpoint mirrors the kiosk contract: a JSON body with a
//! data-URI image and optional coordinates, answered with a structured
//! `{success, msg, ...}` result regardless of outcome. Identity admin and
//! enrollment are thin wrappers over the store and pipeline.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use timeclock_store::{Identity, Store};

use crate::pipeline::{CheckRequest, CheckResponse, EnrollResponse, Pipeline};

pub struct AppState {
    pub pipeline: Pipeline,
    pub store: Arc<Store>,
    pub default_scope: String,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/face_recognition/check", post(check))
        .route("/identities", post(create_identity).get(list_identities))
        .route("/identities/{id}/enroll", post(enroll))
        .with_state(state)
}

async fn health() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

fn resolve_scope(state: &AppState, headers: &HeaderMap) -> String {
    headers
        .get("x-scope")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .unwrap_or(&state.default_scope)
        .to_string()
}

async fn check(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CheckRequest>,
) -> Json<CheckResponse> {
    let scope = resolve_scope(&state, &headers);
    Json(state.pipeline.process(request, &scope).await)
}

#[derive(Debug, Deserialize)]
struct CreateIdentityRequest {
    name: String,
    #[serde(default)]
    scope: Option<String>,
}

#[derive(Debug, Serialize)]
struct IdentitySummary {
    id: i64,
    scope: String,
    name: String,
    active: bool,
    enrolled: bool,
}

impl From<Identity> for IdentitySummary {
    fn from(identity: Identity) -> Self {
        Self {
            id: identity.id,
            scope: identity.scope,
            name: identity.name,
            active: identity.active,
            enrolled: identity.has_encoding,
        }
    }
}

async fn create_identity(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CreateIdentityRequest>,
) -> Result<Json<IdentitySummary>, StatusCode> {
    let scope = request
        .scope
        .unwrap_or_else(|| resolve_scope(&state, &headers));

    match state.store.create_identity(&scope, &request.name) {
        Ok(identity) => Ok(Json(identity.into())),
        Err(err) => {
            tracing::error!(error = %err, "identity creation failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default)]
    scope: Option<String>,
}

async fn list_identities(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<IdentitySummary>>, StatusCode> {
    let scope = query
        .scope
        .unwrap_or_else(|| resolve_scope(&state, &headers));

    match state.store.list_identities(&scope) {
        Ok(identities) => Ok(Json(identities.into_iter().map(Into::into).collect())),
        Err(err) => {
            tracing::error!(error = %err, "identity listing failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[derive(Debug, Deserialize)]
struct EnrollRequest {
    image_data: String,
}

async fn enroll(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(request): Json<EnrollRequest>,
) -> Json<EnrollResponse> {
    Json(state.pipeline.enroll(id, &request.image_data).await)
}
