//! Attempt summary conversion
//!
//! Normalizes a framework object, live or historical, into the record the
//! resolver returns. Conversion is total: absent fields become `None`.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Completion code the orchestrator records for a user-requested stop
const STOP_REQUESTED_CODE: i64 = -210;
/// Completion code for a stop requested by the platform itself
const STOP_BY_PLATFORM_CODE: i64 = -220;

/// Job-level state derived from the framework state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AttemptState {
    Waiting,
    Running,
    Stopping,
    Succeeded,
    Stopped,
    Failed,
    Unknown,
}

impl AttemptState {
    pub fn from_framework(state: Option<&str>, exit_code: Option<i64>) -> Self {
        let stopped = matches!(exit_code, Some(STOP_REQUESTED_CODE | STOP_BY_PLATFORM_CODE));
        match state {
            Some("AttemptCreationPending" | "AttemptCreationRequested" | "AttemptPreparing") => {
                AttemptState::Waiting
            }
            Some("AttemptRunning" | "AttemptCompleted") => AttemptState::Running,
            Some("AttemptDeletionPending" | "AttemptDeletionRequested" | "AttemptDeleting") => {
                if stopped {
                    AttemptState::Stopping
                } else {
                    AttemptState::Running
                }
            }
            Some("Completed") => match exit_code {
                Some(0) => AttemptState::Succeeded,
                _ if stopped => AttemptState::Stopped,
                _ => AttemptState::Failed,
            },
            _ => AttemptState::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRoleSummary {
    pub name: String,
    pub task_number: u64,
}

/// Normalized view of one execution attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptSummary {
    pub job_name: Option<String>,
    pub framework_name: Option<String>,
    pub user_name: Option<String>,
    pub state: AttemptState,
    pub origin_state: Option<String>,
    pub max_attempt_count: Option<i64>,
    pub attempt_index: Option<i64>,
    pub job_started_time: Option<i64>,
    pub attempt_started_time: Option<i64>,
    pub attempt_completed_time: Option<i64>,
    pub exit_code: Option<i64>,
    pub exit_phrase: Option<String>,
    pub exit_type: Option<String>,
    pub total_task_number: u64,
    pub total_task_role_number: usize,
    pub task_roles: Vec<TaskRoleSummary>,
    pub is_latest: bool,
}

/// Converts orchestrator objects into attempt summaries
pub trait AttemptConverter: Send + Sync {
    fn convert(&self, object: &Value, is_latest: bool) -> AttemptSummary;
}

/// Converter for framework-controller objects
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameworkConverter;

impl AttemptConverter for FrameworkConverter {
    fn convert(&self, object: &Value, is_latest: bool) -> AttemptSummary {
        let str_at = |path: &str| object.pointer(path).and_then(Value::as_str).map(str::to_string);
        let int_at = |path: &str| object.pointer(path).and_then(Value::as_i64);
        let time_at = |path: &str| object.pointer(path).and_then(Value::as_str).and_then(epoch_millis);

        let completion = "/status/attemptStatus/completionStatus";
        let exit_code = int_at(&format!("{}/code", completion));
        let origin_state = str_at("/status/state");

        let task_roles: Vec<TaskRoleSummary> = object
            .pointer("/spec/taskRoles")
            .and_then(Value::as_array)
            .map(|roles| {
                roles
                    .iter()
                    .map(|role| TaskRoleSummary {
                        name: role
                            .get("name")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        task_number: role.get("taskNumber").and_then(Value::as_u64).unwrap_or(0),
                    })
                    .collect()
            })
            .unwrap_or_default();

        AttemptSummary {
            job_name: str_at("/metadata/annotations/jobName").or_else(|| str_at("/metadata/name")),
            framework_name: str_at("/metadata/name"),
            user_name: str_at("/metadata/labels/userName"),
            state: AttemptState::from_framework(origin_state.as_deref(), exit_code),
            origin_state,
            max_attempt_count: int_at("/spec/retryPolicy/maxRetryCount").map(|n| n + 1),
            attempt_index: int_at("/status/attemptStatus/id"),
            job_started_time: time_at("/status/startTime"),
            attempt_started_time: time_at("/status/attemptStatus/startTime"),
            attempt_completed_time: time_at("/status/attemptStatus/completionTime"),
            exit_code,
            exit_phrase: str_at(&format!("{}/phrase", completion)),
            exit_type: str_at(&format!("{}/type/name", completion)),
            total_task_number: task_roles.iter().map(|r| r.task_number).sum(),
            total_task_role_number: task_roles.len(),
            task_roles,
            is_latest,
        }
    }
}

fn epoch_millis(timestamp: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(timestamp)
        .ok()
        .map(|t| t.timestamp_millis())
}
