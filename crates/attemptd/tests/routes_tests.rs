//! HTTP contract tests for the job attempt routes.
//!
//! Drives the router in-process against fake backing stores and checks the
//! status codes and bodies the transport layer exposes.

use attempt_history::orchestrator::{framework_object, framework_path};
use attempt_history::{
    encode, ApiResponse, AttemptResolver, FakeHealth, FakeHistoryIndex, FakeOrchestrator,
    HistoryGate, HistoryIndex, OrchestratorVariant, ResolverSettings, TransportError,
};
use attemptd::server::{app, AppState};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const JOB: &str = "alice~train";
const UID: &str = "uid-42";

fn router(orchestrator: FakeOrchestrator, index: Arc<FakeHistoryIndex>) -> Router {
    let gate = HistoryGate::new(
        OrchestratorVariant::Kubernetes,
        Some(index as Arc<dyn HistoryIndex>),
    );
    let resolver = AttemptResolver::new(Arc::new(orchestrator), gate, ResolverSettings::default());
    app(AppState::new(resolver))
}

fn live_orchestrator() -> FakeOrchestrator {
    FakeOrchestrator::new().with_object(
        &framework_path("default", &encode(JOB)),
        framework_object(JOB, UID, 1, 1),
    )
}

fn index_with_first_attempt() -> FakeHistoryIndex {
    FakeHistoryIndex::new().with_snapshot("2024-03-01T10:00:00Z", framework_object(JOB, UID, 1, 0))
}

async fn get(router: Router, uri: &str) -> (StatusCode, Value) {
    let response = router
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn test_list_route() {
    let index = Arc::new(index_with_first_attempt());
    let (status, body) = get(
        router(live_orchestrator(), index),
        "/api/v2/jobs/alice~train/job-attempts",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let attempts = body.as_array().unwrap();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0]["isLatest"], true);
    assert_eq!(attempts[0]["attemptIndex"], 1);
    assert_eq!(attempts[1]["isLatest"], false);
    assert_eq!(attempts[1]["attemptIndex"], 0);
}

#[tokio::test]
async fn test_get_route() {
    let index = Arc::new(index_with_first_attempt());

    let (status, body) = get(
        router(live_orchestrator(), index.clone()),
        "/api/v2/jobs/alice~train/job-attempts/1",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isLatest"], true);
    assert_eq!(index.search_calls(), 0);

    let (status, body) = get(
        router(live_orchestrator(), index.clone()),
        "/api/v2/jobs/alice~train/job-attempts/0",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isLatest"], false);
    assert_eq!(index.search_calls(), 1);

    let (status, body) = get(
        router(live_orchestrator(), index),
        "/api/v2/jobs/alice~train/job-attempts/2",
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
}

#[tokio::test]
async fn test_unknown_job_is_404() {
    let index = Arc::new(index_with_first_attempt());
    let (status, _) = get(
        router(FakeOrchestrator::new(), index.clone()),
        "/api/v2/jobs/bob~missing/job-attempts",
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(index.search_calls(), 0);
}

#[tokio::test]
async fn test_unhealthy_index_is_501() {
    let index = Arc::new(index_with_first_attempt().with_health(FakeHealth::Status(503)));

    let (status, _) = get(
        router(live_orchestrator(), index.clone()),
        "/api/v2/jobs/alice~train/job-attempts/healthz",
    )
    .await;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);

    let (status, body) = get(
        router(live_orchestrator(), index.clone()),
        "/api/v2/jobs/alice~train/job-attempts",
    )
    .await;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    assert_eq!(body["status"], 501);

    let (status, _) = get(
        router(live_orchestrator(), index.clone()),
        "/api/v2/jobs/alice~train/job-attempts/0",
    )
    .await;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    assert_eq!(index.search_calls(), 0);
}

#[tokio::test]
async fn test_healthy_index_healthz() {
    let index = Arc::new(index_with_first_attempt());
    let (status, _) = get(
        router(live_orchestrator(), index),
        "/api/v2/jobs/alice~train/job-attempts/healthz",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_upstream_failure_is_502() {
    let orchestrator = FakeOrchestrator::new().with_response(
        &framework_path("default", &encode(JOB)),
        ApiResponse::new(401, json!({ "message": "Unauthorized" })),
    );
    let (status, body) = get(
        router(orchestrator, Arc::new(index_with_first_attempt())),
        "/api/v2/jobs/alice~train/job-attempts",
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["upstreamStatus"], 401);
    assert!(body["message"].as_str().unwrap().contains("Unauthorized"));
}

#[tokio::test]
async fn test_history_transport_failure_is_502() {
    let index = Arc::new(
        index_with_first_attempt().with_search_transport_error(TransportError::Timeout),
    );
    let (status, body) = get(
        router(live_orchestrator(), index.clone()),
        "/api/v2/jobs/alice~train/job-attempts",
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["status"], 502);
    assert!(body.get("upstreamStatus").is_none());
    assert!(body["message"].as_str().unwrap().contains("Request timed out"));
    assert_eq!(index.search_calls(), 1);
}

#[tokio::test]
async fn test_invalid_attempt_index_is_rejected() {
    let index = Arc::new(index_with_first_attempt());
    let response = router(live_orchestrator(), index)
        .oneshot(
            Request::builder()
                .uri("/api/v2/jobs/alice~train/job-attempts/latest")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_daemon_health() {
    let (status, body) = get(
        router(FakeOrchestrator::new(), Arc::new(FakeHistoryIndex::new())),
        "/v1/health",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}
