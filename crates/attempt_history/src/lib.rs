//! Job attempt history resolver.
//!
//! Reconstructs the ordered retry history of a cluster-scheduled job from the
//! live orchestrator object and an append-only index of historical snapshots.

pub mod convert;
pub mod error;
pub mod gate;
pub mod history;
pub mod name;
pub mod orchestrator;
pub mod query;
pub mod resolver;
pub mod transport;

pub use convert::{AttemptConverter, AttemptState, AttemptSummary, FrameworkConverter};
pub use error::{ResolveError, UpstreamOrigin};
pub use gate::{HistoryGate, OrchestratorVariant};
pub use history::{FakeHealth, FakeHistoryIndex, HistoryIndex, HttpHistoryIndex};
pub use name::{encode, EncodedKey, JobName};
pub use orchestrator::{FakeOrchestrator, HttpOrchestratorClient, LiveJob, LiveLookup, OrchestratorClient};
pub use resolver::{AttemptHistory, AttemptResolver, HistoryCoverage, Reply, ResolverSettings};
pub use transport::{ApiResponse, TransportError};
