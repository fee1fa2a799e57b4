//! attemptd - Job attempt history daemon
//!
//! Serves the retry history of cluster jobs, reconciled from the live
//! orchestrator and the historical snapshot index.

use anyhow::Result;
use attemptd::config::Config;
use attemptd::server::{self, AppState};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging; RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load();
    info!("attemptd v{} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Orchestrator: {} ({:?}, namespace {})",
        config.orchestrator.api_server_uri, config.orchestrator.variant, config.orchestrator.namespace
    );

    let state = AppState::from_config(&config)?;
    server::run(state, &config.server.bind).await
}
