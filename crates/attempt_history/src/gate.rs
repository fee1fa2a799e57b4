//! Source health gate
//!
//! Decides, per call, whether the historical index may be consulted. The
//! gate opens only when the orchestrator variant supports attempt history,
//! an index client was configured, and a live health probe succeeds.
//! Probe failures close the gate; they never surface as errors.

use crate::history::HistoryIndex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Orchestrator flavour the resolver is deployed against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrchestratorVariant {
    /// Framework controller on Kubernetes
    #[serde(rename = "k8s")]
    Kubernetes,
    /// Legacy launcher without snapshot ingestion
    #[serde(rename = "yarn")]
    Yarn,
}

impl OrchestratorVariant {
    pub const LEGACY: OrchestratorVariant = OrchestratorVariant::Yarn;
}

impl Default for OrchestratorVariant {
    fn default() -> Self {
        Self::Kubernetes
    }
}

pub struct HistoryGate {
    variant: OrchestratorVariant,
    index: Option<Arc<dyn HistoryIndex>>,
}

impl HistoryGate {
    pub fn new(variant: OrchestratorVariant, index: Option<Arc<dyn HistoryIndex>>) -> Self {
        Self { variant, index }
    }

    /// Probe the index; yields the client only when it may be used
    pub async fn open(&self) -> Option<&dyn HistoryIndex> {
        if self.variant == OrchestratorVariant::LEGACY {
            debug!("Attempt history unsupported on the legacy orchestrator");
            return None;
        }
        let index = self.index.as_deref()?;

        match index.health().await {
            Ok(status) if (200..300).contains(&status) => Some(index),
            Ok(status) => {
                warn!("History index health probe returned {}", status);
                None
            }
            Err(e) => {
                warn!("History index health probe failed: {}", e);
                None
            }
        }
    }

    pub async fn is_available(&self) -> bool {
        self.open().await.is_some()
    }
}
