//! Live state fetcher
//!
//! Reads the orchestrator's current object for a job and classifies the
//! response as found, not found, or an upstream failure. The live object is
//! authoritative for the in-flight attempt and carries the `uid` that scopes
//! every historical query.
//!
//! Production code uses `HttpOrchestratorClient`; tests use
//! `FakeOrchestrator` with pre-configured objects and call counts.

use crate::error::ResolveError;
use crate::name::EncodedKey;
use crate::transport::{read_response, ApiResponse, TransportError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error};

const FRAMEWORK_API: &str = "/apis/frameworkcontroller.microsoft.com/v1";

/// API path of the framework object named by `key`
pub fn framework_path(namespace: &str, key: &EncodedKey) -> String {
    format!("{}/namespaces/{}/frameworks/{}", FRAMEWORK_API, namespace, key)
}

// ============================================================================
// Client Trait
// ============================================================================

/// Minimal interface to the cluster orchestration API
#[async_trait]
pub trait OrchestratorClient: Send + Sync {
    /// Authenticated GET of a resource path
    async fn get(&self, path: &str) -> Result<ApiResponse, TransportError>;
}

// ============================================================================
// HTTP Client (Production)
// ============================================================================

pub struct HttpOrchestratorClient {
    base_uri: String,
    bearer_token: Option<String>,
    http: reqwest::Client,
}

impl HttpOrchestratorClient {
    pub fn new(
        base_uri: &str,
        bearer_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Other(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_uri: base_uri.trim_end_matches('/').to_string(),
            bearer_token,
            http,
        })
    }
}

#[async_trait]
impl OrchestratorClient for HttpOrchestratorClient {
    async fn get(&self, path: &str) -> Result<ApiResponse, TransportError> {
        let url = format!("{}{}", self.base_uri, path);
        let mut request = self
            .http
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        read_response(response).await
    }
}

// ============================================================================
// Live Object
// ============================================================================

/// Point-in-time copy of the orchestrator's object for a job
#[derive(Debug, Clone, PartialEq)]
pub struct LiveJob {
    pub uid: String,
    /// Retry-policy limit; the index of the live attempt
    pub max_retry_count: i64,
    /// `status.attemptStatus.id`, absent before the first attempt starts
    pub current_attempt_id: Option<i64>,
    pub object: Value,
}

impl LiveJob {
    /// Extract the required fields from a successful response body
    pub fn from_object(object: Value) -> Result<Self, ResolveError> {
        let uid = object
            .pointer("/metadata/uid")
            .and_then(Value::as_str)
            .ok_or_else(|| ResolveError::orchestrator(Some(200), "object has no metadata.uid"))?
            .to_string();
        let max_retry_count = object
            .pointer("/spec/retryPolicy/maxRetryCount")
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                ResolveError::orchestrator(Some(200), "object has no spec.retryPolicy.maxRetryCount")
            })?;
        let current_attempt_id = object
            .pointer("/status/attemptStatus/id")
            .and_then(Value::as_i64);

        Ok(Self {
            uid,
            max_retry_count,
            current_attempt_id,
            object,
        })
    }
}

/// Outcome of a live lookup that reached the orchestrator
#[derive(Debug, Clone, PartialEq)]
pub enum LiveLookup {
    Found(LiveJob),
    NotFound,
}

/// Fetch and classify the live object at `path`. Never retries.
pub async fn fetch_live(
    client: &dyn OrchestratorClient,
    path: &str,
) -> Result<LiveLookup, ResolveError> {
    let response = client.get(path).await.map_err(|e| {
        error!("Orchestrator request for {} failed: {}", path, e);
        ResolveError::orchestrator(None, e.to_string())
    })?;

    match response.status {
        404 => {
            debug!("No live object at {}", path);
            Ok(LiveLookup::NotFound)
        }
        _ if response.is_success() => LiveJob::from_object(response.body).map(LiveLookup::Found),
        status => {
            let message = response.message();
            error!("Orchestrator returned {} for {}: {}", status, path, message);
            Err(ResolveError::orchestrator(Some(status), message))
        }
    }
}

// ============================================================================
// Fake Client (Testing)
// ============================================================================

/// Fake orchestrator serving pre-configured responses by path
///
/// Unknown paths answer 404 like the real API.
#[derive(Default)]
pub struct FakeOrchestrator {
    responses: HashMap<String, Result<ApiResponse, TransportError>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `object` with status 200 at `path`
    pub fn with_object(mut self, path: &str, object: Value) -> Self {
        self.responses
            .insert(path.to_string(), Ok(ApiResponse::new(200, object)));
        self
    }

    pub fn with_response(mut self, path: &str, response: ApiResponse) -> Self {
        self.responses.insert(path.to_string(), Ok(response));
        self
    }

    pub fn with_transport_error(mut self, path: &str, error: TransportError) -> Self {
        self.responses.insert(path.to_string(), Err(error));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn requested_paths(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl OrchestratorClient for FakeOrchestrator {
    async fn get(&self, path: &str) -> Result<ApiResponse, TransportError> {
        self.calls.lock().unwrap().push(path.to_string());

        self.responses.get(path).cloned().unwrap_or_else(|| {
            Ok(ApiResponse::new(
                404,
                json!({"kind": "Status", "message": format!("{} not found", path)}),
            ))
        })
    }
}

/// Minimal framework object for tests and fixtures
pub fn framework_object(name: &str, uid: &str, max_retry_count: i64, attempt_id: i64) -> Value {
    json!({
        "metadata": {
            "name": name,
            "uid": uid,
            "annotations": { "jobName": name },
            "labels": { "userName": "alice" }
        },
        "spec": {
            "retryPolicy": { "maxRetryCount": max_retry_count },
            "taskRoles": [ { "name": "worker", "taskNumber": 2 } ]
        },
        "status": {
            "state": "AttemptRunning",
            "startTime": "2024-03-01T10:00:00Z",
            "attemptStatus": {
                "id": attempt_id,
                "startTime": "2024-03-01T10:05:00Z"
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::encode;

    #[test]
    fn test_framework_path() {
        let key = encode("plain-job");
        assert_eq!(
            framework_path("default", &key),
            "/apis/frameworkcontroller.microsoft.com/v1/namespaces/default/frameworks/plainjob"
        );
    }

    #[tokio::test]
    async fn test_fetch_found() {
        let fake = FakeOrchestrator::new().with_object("/f/a", framework_object("a", "uid-a", 3, 1));

        let lookup = fetch_live(&fake, "/f/a").await.unwrap();
        let LiveLookup::Found(live) = lookup else {
            panic!("expected live object");
        };
        assert_eq!(live.uid, "uid-a");
        assert_eq!(live.max_retry_count, 3);
        assert_eq!(live.current_attempt_id, Some(1));
        assert_eq!(fake.call_count(), 1);
    }

    #[tokio::test]
    async fn test_fetch_not_found_is_not_an_error() {
        let fake = FakeOrchestrator::new();
        assert_eq!(fetch_live(&fake, "/f/missing").await.unwrap(), LiveLookup::NotFound);
    }

    #[tokio::test]
    async fn test_fetch_other_status_is_upstream_error() {
        let fake = FakeOrchestrator::new().with_response(
            "/f/a",
            ApiResponse::new(403, json!({"message": "forbidden"})),
        );

        let err = fetch_live(&fake, "/f/a").await.unwrap_err();
        assert_eq!(err, ResolveError::orchestrator(Some(403), "forbidden"));
    }

    #[tokio::test]
    async fn test_fetch_transport_failure() {
        let fake = FakeOrchestrator::new().with_transport_error("/f/a", TransportError::Timeout);

        let err = fetch_live(&fake, "/f/a").await.unwrap_err();
        assert_eq!(err, ResolveError::orchestrator(None, "Request timed out"));
    }

    #[tokio::test]
    async fn test_fetch_malformed_object() {
        let fake = FakeOrchestrator::new().with_object("/f/a", json!({"metadata": {"uid": "u"}}));

        let err = fetch_live(&fake, "/f/a").await.unwrap_err();
        assert!(matches!(err, ResolveError::Upstream { status: Some(200), .. }));
    }
}
