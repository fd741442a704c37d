//! Read-only REST endpoints over the profile store.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use crate::store::ProfileStore;

/// Shared state for status routes.
#[derive(Clone)]
pub struct StatusRouteState {
    pub store: Arc<dyn ProfileStore>,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// GET /health
async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// GET /api/profiles/{user_id}
///
/// Returns the latest confirmed version, or 404 if the user has none.
async fn get_latest(
    State(state): State<StatusRouteState>,
    Path(user_id): Path<String>,
) -> Response {
    let db = match state.store.load().await {
        Ok(db) => db,
        Err(e) => {
            tracing::error!(error = %e, "Status API failed to load profiles");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Profile store unavailable");
        }
    };

    match db.record(&user_id).and_then(|r| r.latest()) {
        Some(latest) => Json(latest).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "No saved profile for this user"),
    }
}

/// GET /api/profiles/{user_id}/versions
///
/// Returns every confirmed version, oldest first. Unknown users get an
/// empty list.
async fn list_versions(
    State(state): State<StatusRouteState>,
    Path(user_id): Path<String>,
) -> Response {
    match state.store.load().await {
        Ok(db) => {
            let versions = db
                .record(&user_id)
                .map(|r| r.profiles.clone())
                .unwrap_or_default();
            Json(versions).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Status API failed to load profiles");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Profile store unavailable")
        }
    }
}

/// Build the status REST routes.
pub fn status_routes(state: StatusRouteState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/profiles/{user_id}", get(get_latest))
        .route("/api/profiles/{user_id}/versions", get(list_versions))
        .with_state(state)
}
