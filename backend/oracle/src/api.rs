//! Axum REST API handlers for operators.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::db::{self, AttemptRecord};

const DEFAULT_ATTEMPTS: i64 = 100;
const MAX_ATTEMPTS: i64 = 1_000;

pub struct ApiState {
    pub pool: SqlitePool,
    pub identity: String,
    pub categories: Vec<String>,
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/attempts", get(get_attempts))
        .route("/projects/:id/attempts", get(get_project_attempts))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────
// Response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub oracle: String,
    pub categories: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct AttemptsResponse {
    pub count: usize,
    pub attempts: Vec<AttemptRecord>,
}

#[derive(Debug, Serialize)]
pub struct ProjectAttemptsResponse {
    pub project_id: u64,
    pub count: usize,
    pub attempts: Vec<AttemptRecord>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct AttemptsQuery {
    pub limit: Option<i64>,
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        oracle: state.identity.clone(),
        categories: state.categories.clone(),
    })
}

/// `GET /attempts?limit=`
///
/// Most recent verification attempts first.
pub async fn get_attempts(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<AttemptsQuery>,
) -> impl IntoResponse {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_ATTEMPTS)
        .clamp(1, MAX_ATTEMPTS);
    match db::get_attempts(&state.pool, limit).await {
        Ok(attempts) => Json(AttemptsResponse {
            count: attempts.len(),
            attempts,
        })
        .into_response(),
        Err(e) => internal(e),
    }
}

/// `GET /projects/:id/attempts`
///
/// Every attempt recorded for one project, oldest first.
pub async fn get_project_attempts(
    State(state): State<Arc<ApiState>>,
    Path(project_id): Path<u64>,
) -> impl IntoResponse {
    match db::get_attempts_for_project(&state.pool, project_id).await {
        Ok(attempts) => Json(ProjectAttemptsResponse {
            project_id,
            count: attempts.len(),
            attempts,
        })
        .into_response(),
        Err(e) => internal(e),
    }
}

fn internal(e: crate::errors::OracleError) -> axum::response::Response {
    error!("DB error: {e}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
        .into_response()
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
