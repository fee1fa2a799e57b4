//! Configuration management for attemptd.
//!
//! Loads settings from /etc/attemptd/config.toml or uses defaults.
//! `ATTEMPTD_CONFIG` points at an alternative file.

use anyhow::{Context, Result};
use attempt_history::{OrchestratorVariant, ResolverSettings};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Config file path
pub const CONFIG_PATH: &str = "/etc/attemptd/config.toml";

/// Fallback config file path
pub const DEFAULT_CONFIG_PATH: &str = "/var/lib/attemptd/config.toml";

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "ATTEMPTD_CONFIG";

/// Overrides `orchestrator.bearer_token`
pub const BEARER_TOKEN_ENV: &str = "ATTEMPTD_BEARER_TOKEN";

/// Overrides `history.endpoint`
pub const HISTORY_ENDPOINT_ENV: &str = "ATTEMPTD_HISTORY_ENDPOINT";

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:9186".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Orchestrator API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub variant: OrchestratorVariant,

    #[serde(default = "default_api_server_uri")]
    pub api_server_uri: String,

    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default)]
    pub bearer_token: Option<String>,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_api_server_uri() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_timeout() -> u64 {
    10
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            variant: OrchestratorVariant::default(),
            api_server_uri: default_api_server_uri(),
            namespace: default_namespace(),
            bearer_token: None,
            timeout_secs: default_timeout(),
        }
    }
}

/// Historical index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// No endpoint means no historical index in this deployment
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_index")]
    pub index: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_attempt_buckets")]
    pub max_attempt_buckets: u32,
}

fn default_index() -> String {
    "framework".to_string()
}

fn default_max_attempt_buckets() -> u32 {
    1000
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            index: default_index(),
            timeout_secs: default_timeout(),
            max_attempt_buckets: default_max_attempt_buckets(),
        }
    }
}

/// Main attemptd configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub history: HistoryConfig,
}

impl Config {
    /// Load from `ATTEMPTD_CONFIG`, then the standard paths, then defaults
    pub fn load() -> Self {
        let config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::load_from_path(&path).unwrap_or_else(|e| {
                warn!("Failed to load {}, using defaults: {:#}", path, e);
                Config::default()
            }),
            Err(_) => Self::load_from_path(CONFIG_PATH)
                .or_else(|_| Self::load_from_path(DEFAULT_CONFIG_PATH))
                .unwrap_or_else(|e| {
                    warn!("Config not found, using defaults: {:#}", e);
                    Config::default()
                }),
        };
        config.with_env_overrides(|key| std::env::var(key).ok())
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Apply environment overrides; `lookup` is injectable for tests
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(token) = lookup(BEARER_TOKEN_ENV).filter(|t| !t.is_empty()) {
            self.orchestrator.bearer_token = Some(token);
        }
        if let Some(endpoint) = lookup(HISTORY_ENDPOINT_ENV).filter(|e| !e.is_empty()) {
            self.history.endpoint = Some(endpoint);
        }
        self
    }

    pub fn resolver_settings(&self) -> ResolverSettings {
        ResolverSettings {
            namespace: self.orchestrator.namespace.clone(),
            history_index: self.history.index.clone(),
            max_attempt_buckets: self.history.max_attempt_buckets,
        }
    }

    pub fn orchestrator_timeout(&self) -> Duration {
        Duration::from_secs(self.orchestrator.timeout_secs)
    }

    pub fn history_timeout(&self) -> Duration {
        Duration::from_secs(self.history.timeout_secs)
    }
}
