//! API routes for attemptd
//!
//! Job attempt endpoints mirror the resolver contract: 200 with data, 404
//! for an unknown job or attempt, 501 when attempt history is unsupported
//! in this deployment, 502 for upstream failures.

use crate::server::AppState;
use attempt_history::{Reply, ResolveError};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

type AppStateArc = Arc<AppState>;

/// Error body for non-200 replies
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub status: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_status: Option<u16>,
}

// ============================================================================
// Health Routes
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub version: String,
    pub uptime_secs: u64,
}

pub fn health_routes() -> Router<AppStateArc> {
    Router::new().route("/v1/health", get(health))
}

async fn health(State(state): State<AppStateArc>) -> Json<HealthResponse> {
    Json(HealthResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

// ============================================================================
// Job Attempt Routes
// ============================================================================

pub fn attempt_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/api/v2/jobs/:job_name/job-attempts/healthz", get(attempts_healthz))
        .route("/api/v2/jobs/:job_name/job-attempts", get(list_attempts))
        .route(
            "/api/v2/jobs/:job_name/job-attempts/:attempt_index",
            get(get_attempt),
        )
}

async fn attempts_healthz(State(state): State<AppStateArc>) -> StatusCode {
    if state.resolver.health_check().await {
        StatusCode::OK
    } else {
        StatusCode::NOT_IMPLEMENTED
    }
}

async fn list_attempts(
    State(state): State<AppStateArc>,
    Path(job_name): Path<String>,
) -> Response {
    match state.resolver.list_reply(&job_name).await {
        Ok(reply) => reply_response(reply, &job_name),
        Err(e) => upstream_response(e, &job_name),
    }
}

async fn get_attempt(
    State(state): State<AppStateArc>,
    Path((job_name, attempt_index)): Path<(String, u32)>,
) -> Response {
    match state.resolver.get_reply(&job_name, attempt_index).await {
        Ok(reply) => reply_response(reply, &job_name),
        Err(e) => upstream_response(e, &job_name),
    }
}

fn reply_response<T: Serialize>(reply: Reply<T>, job_name: &str) -> Response {
    match (reply.status, reply.data) {
        (200, Some(data)) => (StatusCode::OK, Json(data)).into_response(),
        (501, _) => error_body(
            StatusCode::NOT_IMPLEMENTED,
            "Job attempt history is not supported in this deployment".to_string(),
            None,
        ),
        _ => error_body(
            StatusCode::NOT_FOUND,
            format!("Job attempt not found for {}", job_name),
            None,
        ),
    }
}

fn upstream_response(e: ResolveError, job_name: &str) -> Response {
    if !e.is_user_facing() {
        error!("Resolving attempts of {} failed: {}", job_name, e);
    }
    let upstream_status = match &e {
        ResolveError::Upstream { status, .. } => *status,
        _ => None,
    };
    let code = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::BAD_GATEWAY);
    error_body(code, e.to_string(), upstream_status)
}

fn error_body(code: StatusCode, message: String, upstream_status: Option<u16>) -> Response {
    (
        code,
        Json(ErrorBody {
            status: code.as_u16(),
            message,
            upstream_status,
        }),
    )
        .into_response()
}
