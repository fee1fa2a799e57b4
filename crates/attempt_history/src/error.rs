//! Error types for attempt resolution.

use std::fmt;
use thiserror::Error;

/// Which backing store produced an upstream failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamOrigin {
    Orchestrator,
    HistoryIndex,
}

impl fmt::Display for UpstreamOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamOrigin::Orchestrator => write!(f, "orchestrator"),
            UpstreamOrigin::HistoryIndex => write!(f, "history index"),
        }
    }
}

fn status_label(status: &Option<u16>) -> String {
    status.map_or_else(|| "none".to_string(), |s| s.to_string())
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Job attempt history is not supported in this deployment")]
    Unsupported,

    #[error("{origin} error (status {}): {message}", status_label(.status))]
    Upstream {
        origin: UpstreamOrigin,
        status: Option<u16>,
        message: String,
    },
}

impl ResolveError {
    pub fn not_found(what: impl Into<String>) -> Self {
        ResolveError::NotFound(what.into())
    }

    pub fn orchestrator(status: Option<u16>, message: impl Into<String>) -> Self {
        ResolveError::Upstream {
            origin: UpstreamOrigin::Orchestrator,
            status,
            message: message.into(),
        }
    }

    pub fn history(status: Option<u16>, message: impl Into<String>) -> Self {
        ResolveError::Upstream {
            origin: UpstreamOrigin::HistoryIndex,
            status,
            message: message.into(),
        }
    }

    /// HTTP status the transport layer answers with
    pub fn status_code(&self) -> u16 {
        match self {
            ResolveError::NotFound(_) => 404,
            ResolveError::Unsupported => 501,
            ResolveError::Upstream { .. } => 502,
        }
    }

    /// True for outcomes a caller is expected to see in normal operation
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, ResolveError::Upstream { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ResolveError::not_found("job x").status_code(), 404);
        assert_eq!(ResolveError::Unsupported.status_code(), 501);
        assert_eq!(ResolveError::orchestrator(Some(500), "boom").status_code(), 502);
    }

    #[test]
    fn test_upstream_display_includes_status() {
        let err = ResolveError::history(Some(503), "cluster red");
        assert_eq!(err.to_string(), "history index error (status 503): cluster red");

        let err = ResolveError::orchestrator(None, "connection refused");
        assert_eq!(err.to_string(), "orchestrator error (status none): connection refused");
        assert!(!err.is_user_facing());
    }
}
