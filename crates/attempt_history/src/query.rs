//! History query builder
//!
//! Builds the two aggregation queries run against the historical index and
//! parses their responses. Both queries filter snapshots by the live `uid`
//! (names can be reused after deletion, uids cannot) and keep only the
//! snapshot with the latest `collectTime`:
//!
//! - all attempts: one bucket per attempt id, highest id first
//! - single attempt: additionally filtered to one attempt id

use crate::error::ResolveError;
use serde_json::{json, Value};

pub const UID_FIELD: &str = "objectSnapshot.metadata.uid";
pub const ATTEMPT_ID_FIELD: &str = "objectSnapshot.status.attemptStatus.id";
pub const COLLECT_TIME_FIELD: &str = "collectTime";
pub const SNAPSHOT_FIELD: &str = "objectSnapshot";

/// Aggregation grouping snapshots by attempt id
pub const ATTEMPT_GROUP_AGG: &str = "attempt_group";
/// Aggregation keeping the latest snapshot of a set
pub const LATEST_SNAPSHOT_AGG: &str = "latest_snapshot";

/// Latest indexed copy of an orchestrator object for one attempt
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalSnapshot {
    pub attempt_id: i64,
    pub collect_time: Option<String>,
    pub object: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryQuery<'a> {
    /// `max_buckets` caps the number of attempt groups returned
    AllAttempts { uid: &'a str, max_buckets: u32 },
    SingleAttempt { uid: &'a str, attempt_id: i64 },
}

impl HistoryQuery<'_> {
    /// Request body sent to the index's search endpoint
    pub fn body(&self) -> Value {
        match *self {
            HistoryQuery::AllAttempts { uid, max_buckets } => json!({
                "size": 0,
                "query": { "bool": { "filter": [ { "term": { UID_FIELD: uid } } ] } },
                "aggs": {
                    ATTEMPT_GROUP_AGG: {
                        "terms": {
                            "field": ATTEMPT_ID_FIELD,
                            "order": { "_key": "desc" },
                            "size": max_buckets
                        },
                        "aggs": { LATEST_SNAPSHOT_AGG: latest_hit() }
                    }
                }
            }),
            HistoryQuery::SingleAttempt { uid, attempt_id } => json!({
                "size": 0,
                "query": { "bool": { "filter": [
                    { "term": { UID_FIELD: uid } },
                    { "term": { ATTEMPT_ID_FIELD: attempt_id } }
                ] } },
                "aggs": { LATEST_SNAPSHOT_AGG: latest_hit() }
            }),
        }
    }
}

fn latest_hit() -> Value {
    json!({
        "top_hits": {
            "sort": [ { COLLECT_TIME_FIELD: { "order": "desc" } } ],
            "size": 1
        }
    })
}

/// Parse the all-attempts response, preserving bucket order
pub fn parse_attempt_groups(body: &Value) -> Result<Vec<HistoricalSnapshot>, ResolveError> {
    let buckets = body
        .pointer(&format!("/aggregations/{}/buckets", ATTEMPT_GROUP_AGG))
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("missing attempt group buckets"))?;

    let mut snapshots = Vec::with_capacity(buckets.len());
    for bucket in buckets {
        let attempt_id = bucket
            .get("key")
            .and_then(Value::as_i64)
            .ok_or_else(|| malformed("attempt bucket without numeric key"))?;
        if let Some(hit) = first_hit(bucket.get(LATEST_SNAPSHOT_AGG)) {
            snapshots.push(snapshot_from_hit(hit, Some(attempt_id))?);
        }
    }
    Ok(snapshots)
}

/// Parse the single-attempt response; `None` when no snapshot matched
pub fn parse_latest_snapshot(body: &Value) -> Result<Option<HistoricalSnapshot>, ResolveError> {
    let agg = body
        .pointer(&format!("/aggregations/{}", LATEST_SNAPSHOT_AGG))
        .ok_or_else(|| malformed("missing latest snapshot aggregation"))?;

    first_hit(Some(agg))
        .map(|hit| snapshot_from_hit(hit, None))
        .transpose()
}

fn first_hit(agg: Option<&Value>) -> Option<&Value> {
    agg?.pointer("/hits/hits")?.as_array()?.first()
}

fn snapshot_from_hit(hit: &Value, bucket_key: Option<i64>) -> Result<HistoricalSnapshot, ResolveError> {
    let source = hit
        .get("_source")
        .ok_or_else(|| malformed("hit without _source"))?;
    let object = source
        .get(SNAPSHOT_FIELD)
        .cloned()
        .ok_or_else(|| malformed("hit without objectSnapshot"))?;
    let attempt_id = bucket_key
        .or_else(|| object.pointer("/status/attemptStatus/id").and_then(Value::as_i64))
        .ok_or_else(|| malformed("snapshot without attempt id"))?;

    Ok(HistoricalSnapshot {
        attempt_id,
        collect_time: source
            .get(COLLECT_TIME_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string),
        object,
    })
}

fn malformed(what: &str) -> ResolveError {
    ResolveError::history(Some(200), format!("malformed search response: {}", what))
}
