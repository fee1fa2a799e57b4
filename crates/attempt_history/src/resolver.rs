//! Attempt reconciler
//!
//! Combines the live orchestrator object with historical snapshots into an
//! ordered attempt history. The live object is always the latest attempt;
//! history only supplies superseded attempts. Which side answers a single
//! attempt lookup is decided by the live retry-policy limit, re-read on
//! every call:
//!
//! - index < maxRetryCount: superseded, looked up in history
//! - index == maxRetryCount: the live attempt
//! - index > maxRetryCount: does not exist yet

use crate::convert::{AttemptConverter, AttemptSummary, FrameworkConverter};
use crate::error::ResolveError;
use crate::gate::HistoryGate;
use crate::history::HistoryIndex;
use crate::name::encode;
use crate::orchestrator::{fetch_live, framework_path, LiveJob, LiveLookup, OrchestratorClient};
use crate::query::{parse_attempt_groups, parse_latest_snapshot, HistoryQuery};
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, error};

/// Lookup scoping shared by every resolution call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverSettings {
    /// Orchestrator namespace holding job objects
    pub namespace: String,
    /// Historical index name
    pub history_index: String,
    /// Upper bound on attempt groups fetched by a list
    pub max_attempt_buckets: u32,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            history_index: "framework".to_string(),
            max_attempt_buckets: 1000,
        }
    }
}

/// Whether a list includes superseded attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryCoverage {
    Complete,
    /// History was unavailable; only the live attempt is present
    LiveOnly,
}

/// Attempts of one job, most recent first
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptHistory {
    pub attempts: Vec<AttemptSummary>,
    pub coverage: HistoryCoverage,
}

/// Exposed reply: HTTP-style status plus optional data
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply<T> {
    pub status: u16,
    pub data: Option<T>,
}

impl<T> Reply<T> {
    pub fn ok(data: T) -> Self {
        Self { status: 200, data: Some(data) }
    }

    pub fn not_found() -> Self {
        Self { status: 404, data: None }
    }

    pub fn unsupported() -> Self {
        Self { status: 501, data: None }
    }
}

/// Gate evaluation policy for one call
#[derive(Clone, Copy)]
enum HistoryAccess<'a> {
    /// Probe the gate only when history is needed
    Probe,
    /// Gate already evaluated by the caller
    Open(&'a dyn HistoryIndex),
}

pub struct AttemptResolver {
    orchestrator: Arc<dyn OrchestratorClient>,
    gate: HistoryGate,
    converter: Arc<dyn AttemptConverter>,
    settings: ResolverSettings,
}

impl AttemptResolver {
    pub fn new(
        orchestrator: Arc<dyn OrchestratorClient>,
        gate: HistoryGate,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            orchestrator,
            gate,
            converter: Arc::new(FrameworkConverter),
            settings,
        }
    }

    /// Replace the default framework converter
    pub fn with_converter(mut self, converter: Arc<dyn AttemptConverter>) -> Self {
        self.converter = converter;
        self
    }

    /// Capability probe; re-evaluated on every call
    pub async fn health_check(&self) -> bool {
        self.gate.is_available().await
    }

    /// All attempts of a job, live attempt first.
    ///
    /// With the gate closed the live attempt alone is returned, marked
    /// `HistoryCoverage::LiveOnly`.
    pub async fn list_attempts(&self, job_name: &str) -> Result<AttemptHistory, ResolveError> {
        self.list_with(job_name, HistoryAccess::Probe).await
    }

    /// One attempt of a job by index
    pub async fn get_attempt(
        &self,
        job_name: &str,
        attempt_index: u32,
    ) -> Result<AttemptSummary, ResolveError> {
        self.get_with(job_name, attempt_index, HistoryAccess::Probe)
            .await
    }

    /// Exposed list contract: 501 when the gate is closed, 404 when absent
    pub async fn list_reply(
        &self,
        job_name: &str,
    ) -> Result<Reply<Vec<AttemptSummary>>, ResolveError> {
        let Some(index) = self.gate.open().await else {
            return Ok(Reply::unsupported());
        };
        into_reply(
            self.list_with(job_name, HistoryAccess::Open(index))
                .await
                .map(|history| history.attempts),
        )
    }

    /// Exposed get contract: 501 when the gate is closed, 404 when absent
    pub async fn get_reply(
        &self,
        job_name: &str,
        attempt_index: u32,
    ) -> Result<Reply<AttemptSummary>, ResolveError> {
        let Some(index) = self.gate.open().await else {
            return Ok(Reply::unsupported());
        };
        into_reply(
            self.get_with(job_name, attempt_index, HistoryAccess::Open(index))
                .await,
        )
    }

    async fn list_with(
        &self,
        job_name: &str,
        access: HistoryAccess<'_>,
    ) -> Result<AttemptHistory, ResolveError> {
        let live = self.require_live(job_name).await?;
        let mut attempts = vec![self.converter.convert(&live.object, true)];

        let Some(index) = self.resolve_access(access).await else {
            debug!("History unavailable, listing live attempt of {} only", job_name);
            return Ok(AttemptHistory {
                attempts,
                coverage: HistoryCoverage::LiveOnly,
            });
        };

        let query = HistoryQuery::AllAttempts {
            uid: &live.uid,
            max_buckets: self.settings.max_attempt_buckets,
        }
        .body();
        let response = self.search(index, &query).await?;
        let groups = parse_attempt_groups(&response)?;
        if groups.is_empty() {
            // No recorded history is reported as a missing job
            return Err(ResolveError::not_found(format!(
                "no attempt history for job {}",
                job_name
            )));
        }

        attempts.extend(
            groups
                .iter()
                .filter(|snapshot| Some(snapshot.attempt_id) != live.current_attempt_id)
                .map(|snapshot| self.converter.convert(&snapshot.object, false)),
        );

        Ok(AttemptHistory {
            attempts,
            coverage: HistoryCoverage::Complete,
        })
    }

    async fn get_with(
        &self,
        job_name: &str,
        attempt_index: u32,
        access: HistoryAccess<'_>,
    ) -> Result<AttemptSummary, ResolveError> {
        let live = self.require_live(job_name).await?;

        match i64::from(attempt_index).cmp(&live.max_retry_count) {
            Ordering::Equal => Ok(self.converter.convert(&live.object, true)),
            Ordering::Greater => Err(ResolveError::not_found(format!(
                "attempt {} of job {} does not exist",
                attempt_index, job_name
            ))),
            Ordering::Less => {
                let index = self
                    .resolve_access(access)
                    .await
                    .ok_or(ResolveError::Unsupported)?;
                let query = HistoryQuery::SingleAttempt {
                    uid: &live.uid,
                    attempt_id: i64::from(attempt_index),
                }
                .body();
                let response = self.search(index, &query).await?;

                match parse_latest_snapshot(&response)? {
                    Some(snapshot) => Ok(self.converter.convert(&snapshot.object, false)),
                    None => Err(ResolveError::not_found(format!(
                        "no history for attempt {} of job {}",
                        attempt_index, job_name
                    ))),
                }
            }
        }
    }

    async fn require_live(&self, job_name: &str) -> Result<LiveJob, ResolveError> {
        let key = encode(job_name);
        let path = framework_path(&self.settings.namespace, &key);
        debug!("Resolving job {} as {}", job_name, key);

        match fetch_live(self.orchestrator.as_ref(), &path).await? {
            LiveLookup::Found(live) => Ok(live),
            LiveLookup::NotFound => Err(ResolveError::not_found(format!("job {}", job_name))),
        }
    }

    async fn resolve_access<'a>(&'a self, access: HistoryAccess<'a>) -> Option<&'a dyn HistoryIndex> {
        match access {
            HistoryAccess::Probe => self.gate.open().await,
            HistoryAccess::Open(index) => Some(index),
        }
    }

    async fn search(
        &self,
        index: &dyn HistoryIndex,
        query: &serde_json::Value,
    ) -> Result<serde_json::Value, ResolveError> {
        let response = index
            .search(&self.settings.history_index, query)
            .await
            .map_err(|e| {
                error!("History search failed: {}", e);
                ResolveError::history(None, e.to_string())
            })?;

        if !response.is_success() {
            let message = response.message();
            error!("History index returned {}: {}", response.status, message);
            return Err(ResolveError::history(Some(response.status), message));
        }
        Ok(response.body)
    }
}

fn into_reply<T>(result: Result<T, ResolveError>) -> Result<Reply<T>, ResolveError> {
    match result {
        Ok(data) => Ok(Reply::ok(data)),
        Err(ResolveError::NotFound(what)) => {
            debug!("Not found: {}", what);
            Ok(Reply::not_found())
        }
        Err(ResolveError::Unsupported) => Ok(Reply::unsupported()),
        Err(e) => Err(e),
    }
}
