//! HTTP server for attemptd

use crate::config::Config;
use crate::routes;
use anyhow::{Context, Result};
use attempt_history::{
    AttemptResolver, HistoryGate, HistoryIndex, HttpHistoryIndex, HttpOrchestratorClient,
};
use axum::Router;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Application state shared across handlers
pub struct AppState {
    pub resolver: Arc<AttemptResolver>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(resolver: AttemptResolver) -> Self {
        Self {
            resolver: Arc::new(resolver),
            start_time: Instant::now(),
        }
    }

    /// Wire the HTTP clients described by `config` into a resolver
    pub fn from_config(config: &Config) -> Result<Self> {
        let orchestrator = HttpOrchestratorClient::new(
            &config.orchestrator.api_server_uri,
            config.orchestrator.bearer_token.clone(),
            config.orchestrator_timeout(),
        )
        .context("Failed to build orchestrator client")?;

        let history: Option<Arc<dyn HistoryIndex>> = match &config.history.endpoint {
            Some(endpoint) => {
                let index = HttpHistoryIndex::new(endpoint, config.history_timeout())
                    .context("Failed to build history index client")?;
                info!("History index: {} (index {})", endpoint, config.history.index);
                Some(Arc::new(index))
            }
            None => {
                info!("No history index configured; attempt history disabled");
                None
            }
        };

        let gate = HistoryGate::new(config.orchestrator.variant, history);
        Ok(Self::new(AttemptResolver::new(
            Arc::new(orchestrator),
            gate,
            config.resolver_settings(),
        )))
    }
}

/// Build the router with all routes mounted
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::health_routes())
        .merge(routes::attempt_routes())
        .with_state(Arc::new(state))
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP server until Ctrl-C
pub async fn run(state: AppState, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("Listening on http://{}", bind);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutting down gracefully"),
        Err(e) => {
            error!("Failed to install Ctrl-C handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
