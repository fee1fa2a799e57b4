//! Historical index client
//!
//! The historical index is an external search store holding periodic
//! snapshots of orchestrator objects, one document per collection:
//! `{ "collectTime": <RFC 3339>, "objectSnapshot": <object> }`.

use crate::query::{
    ATTEMPT_GROUP_AGG, ATTEMPT_ID_FIELD, COLLECT_TIME_FIELD, LATEST_SNAPSHOT_AGG, SNAPSHOT_FIELD,
};
use crate::transport::{read_response, ApiResponse, TransportError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Minimal interface to the historical search index
#[async_trait]
pub trait HistoryIndex: Send + Sync {
    /// Run an aggregation query against `index`
    async fn search(&self, index: &str, query: &Value) -> Result<ApiResponse, TransportError>;

    /// Cluster health probe, returning the HTTP status
    async fn health(&self) -> Result<u16, TransportError>;
}

// ============================================================================
// HTTP Client (Production)
// ============================================================================

pub struct HttpHistoryIndex {
    endpoint: String,
    http: reqwest::Client,
}

impl HttpHistoryIndex {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Other(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            http,
        })
    }
}

#[async_trait]
impl HistoryIndex for HttpHistoryIndex {
    async fn search(&self, index: &str, query: &Value) -> Result<ApiResponse, TransportError> {
        let response = self
            .http
            .post(format!("{}/{}/_search", self.endpoint, index))
            .json(query)
            .send()
            .await?;
        read_response(response).await
    }

    async fn health(&self) -> Result<u16, TransportError> {
        let response = self
            .http
            .get(format!("{}/_cluster/health", self.endpoint))
            .send()
            .await?;
        Ok(response.status().as_u16())
    }
}

// ============================================================================
// Fake Index (Testing)
// ============================================================================

/// How the fake answers health probes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeHealth {
    Status(u16),
    Unreachable,
}

/// In-memory index evaluating the two query shapes built by `HistoryQuery`
///
/// Documents are stored as indexed, so tests cover both the query body and
/// the response parser.
pub struct FakeHistoryIndex {
    documents: Vec<Value>,
    health: FakeHealth,
    search_failure: Option<Result<ApiResponse, TransportError>>,
    search_calls: AtomicUsize,
    health_calls: AtomicUsize,
    last_query: Mutex<Option<Value>>,
}

impl FakeHistoryIndex {
    pub fn new() -> Self {
        Self {
            documents: Vec::new(),
            health: FakeHealth::Status(200),
            search_failure: None,
            search_calls: AtomicUsize::new(0),
            health_calls: AtomicUsize::new(0),
            last_query: Mutex::new(None),
        }
    }

    /// Index one snapshot of `object` collected at `collect_time`
    pub fn with_snapshot(mut self, collect_time: &str, object: Value) -> Self {
        self.documents.push(json!({
            COLLECT_TIME_FIELD: collect_time,
            SNAPSHOT_FIELD: object,
        }));
        self
    }

    pub fn with_health(mut self, health: FakeHealth) -> Self {
        self.health = health;
        self
    }

    /// Answer every search with `response`
    pub fn with_search_failure(mut self, response: ApiResponse) -> Self {
        self.search_failure = Some(Ok(response));
        self
    }

    /// Fail every search before any response is received
    pub fn with_search_transport_error(mut self, error: TransportError) -> Self {
        self.search_failure = Some(Err(error));
        self
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn health_calls(&self) -> usize {
        self.health_calls.load(Ordering::SeqCst)
    }

    pub fn last_query(&self) -> Option<Value> {
        self.last_query.lock().unwrap().clone()
    }

    fn matching(&self, query: &Value) -> Vec<&Value> {
        let terms: Vec<(&str, &Value)> = query
            .pointer("/query/bool/filter")
            .and_then(Value::as_array)
            .map(|filters| {
                filters
                    .iter()
                    .filter_map(|f| f.get("term")?.as_object())
                    .flat_map(|term| term.iter().map(|(k, v)| (k.as_str(), v)))
                    .collect()
            })
            .unwrap_or_default();

        self.documents
            .iter()
            .filter(|doc| {
                terms
                    .iter()
                    .all(|(field, expected)| field_value(doc, field) == Some(*expected))
            })
            .collect()
    }
}

impl Default for FakeHistoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn field_value<'a>(doc: &'a Value, field: &str) -> Option<&'a Value> {
    doc.pointer(&format!("/{}", field.replace('.', "/")))
}

fn latest<'a>(docs: impl IntoIterator<Item = &'a Value>) -> Option<&'a Value> {
    docs.into_iter().max_by(|a, b| {
        let ta = field_value(a, COLLECT_TIME_FIELD).and_then(Value::as_str);
        let tb = field_value(b, COLLECT_TIME_FIELD).and_then(Value::as_str);
        ta.cmp(&tb)
    })
}

fn hits(doc: Option<&Value>) -> Value {
    let hits: Vec<Value> = doc.map(|d| json!({ "_source": d })).into_iter().collect();
    json!({ "hits": { "hits": hits } })
}

#[async_trait]
impl HistoryIndex for FakeHistoryIndex {
    async fn search(&self, _index: &str, query: &Value) -> Result<ApiResponse, TransportError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_query.lock().unwrap() = Some(query.clone());

        if let Some(failure) = &self.search_failure {
            return failure.clone();
        }

        let docs = self.matching(query);
        let aggs = query.get("aggs").cloned().unwrap_or(Value::Null);

        let aggregations = if let Some(group) = aggs.get(ATTEMPT_GROUP_AGG) {
            let limit = group
                .pointer("/terms/size")
                .and_then(Value::as_u64)
                .unwrap_or(10) as usize;
            let mut by_attempt: BTreeMap<i64, Vec<&Value>> = BTreeMap::new();
            for doc in docs {
                if let Some(id) = field_value(doc, ATTEMPT_ID_FIELD).and_then(Value::as_i64) {
                    by_attempt.entry(id).or_default().push(doc);
                }
            }
            let buckets: Vec<Value> = by_attempt
                .into_iter()
                .rev()
                .take(limit)
                .map(|(id, docs)| {
                    let count = docs.len();
                    json!({
                        "key": id,
                        "doc_count": count,
                        LATEST_SNAPSHOT_AGG: hits(latest(docs)),
                    })
                })
                .collect();
            json!({ ATTEMPT_GROUP_AGG: { "buckets": buckets } })
        } else {
            json!({ LATEST_SNAPSHOT_AGG: hits(latest(docs)) })
        };

        Ok(ApiResponse::new(200, json!({ "aggregations": aggregations })))
    }

    async fn health(&self) -> Result<u16, TransportError> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        match &self.health {
            FakeHealth::Status(code) => Ok(*code),
            FakeHealth::Unreachable => Err(TransportError::Connect("connection refused".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{parse_attempt_groups, parse_latest_snapshot, HistoryQuery};

    fn snapshot(uid: &str, attempt: i64, marker: &str) -> Value {
        json!({
            "metadata": { "uid": uid },
            "status": { "attemptStatus": { "id": attempt } },
            "marker": marker
        })
    }

    fn index() -> FakeHistoryIndex {
        FakeHistoryIndex::new()
            .with_snapshot("2024-03-01T10:00:00Z", snapshot("u", 0, "0-early"))
            .with_snapshot("2024-03-01T11:00:00Z", snapshot("u", 0, "0-late"))
            .with_snapshot("2024-03-01T12:00:00Z", snapshot("u", 1, "1-only"))
            .with_snapshot("2024-03-01T13:00:00Z", snapshot("other", 5, "other"))
    }

    #[tokio::test]
    async fn test_fake_groups_latest_per_attempt() {
        let index = index();
        let query = HistoryQuery::AllAttempts {
            uid: "u",
            max_buckets: 100,
        }
        .body();

        let response = index.search("framework", &query).await.unwrap();
        let groups = parse_attempt_groups(&response.body).unwrap();

        let markers: Vec<&str> = groups
            .iter()
            .map(|s| s.object["marker"].as_str().unwrap())
            .collect();
        assert_eq!(markers, vec!["1-only", "0-late"]);
        assert_eq!(index.search_calls(), 1);
    }

    #[tokio::test]
    async fn test_fake_single_attempt() {
        let index = index();

        let query = HistoryQuery::SingleAttempt { uid: "u", attempt_id: 0 }.body();
        let response = index.search("framework", &query).await.unwrap();
        let found = parse_latest_snapshot(&response.body).unwrap().unwrap();
        assert_eq!(found.object["marker"], "0-late");
        assert_eq!(found.collect_time.as_deref(), Some("2024-03-01T11:00:00Z"));

        let query = HistoryQuery::SingleAttempt { uid: "u", attempt_id: 7 }.body();
        let response = index.search("framework", &query).await.unwrap();
        assert_eq!(parse_latest_snapshot(&response.body).unwrap(), None);
    }

    #[tokio::test]
    async fn test_fake_search_transport_error() {
        let index = index().with_search_transport_error(TransportError::Timeout);
        let query = HistoryQuery::SingleAttempt { uid: "u", attempt_id: 0 }.body();

        let err = index.search("framework", &query).await.unwrap_err();
        assert_eq!(err, TransportError::Timeout);
        assert_eq!(index.search_calls(), 1);
    }

    #[tokio::test]
    async fn test_fake_health() {
        let index = FakeHistoryIndex::new().with_health(FakeHealth::Unreachable);
        assert!(index.health().await.is_err());
        assert_eq!(index.health_calls(), 1);

        let index = FakeHistoryIndex::new().with_health(FakeHealth::Status(503));
        assert_eq!(index.health().await.unwrap(), 503);
    }
}
