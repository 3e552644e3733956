//! Coding-agent configuration.
//!
//! [`ConnectionConfig`] is the small JSON file holding the endpoint, key,
//! model, and context limit. It is read once at startup and only written
//! when the user passes `--save-config`. [`CodeConfig`] combines it with the
//! command-line settings and converts everything into tiller-rs types via
//! [`build_agent_config`](CodeConfig::build_agent_config) and
//! [`build_dispatcher`](CodeConfig::build_dispatcher).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tiller_rs::agent::AgentConfig;
use tiller_rs::context::DEFAULT_CONTEXT_WINDOW;
use tiller_rs::tools::{DEFAULT_TOOL_TIMEOUT, DispatcherConfig, ToolDispatcher};
use tiller_rs::{AgentError, DEFAULT_ENDPOINT, DEFAULT_MODEL, Result};
use tracing::{debug, info};

use crate::prompt::coding_system_prompt;

/// Environment variable that overrides the stored API key.
pub const API_KEY_ENV: &str = "TILLER_API_KEY";

// ── Persisted connection ──────────────────────────────────────────────

/// Contents of `~/.tiller/config.json`. Missing fields take defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Base URL of the OpenAI-compatible endpoint.
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    /// Context budget in tokens.
    pub context_limit: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            context_limit: DEFAULT_CONTEXT_WINDOW,
        }
    }
}

impl ConnectionConfig {
    /// Default location: `~/.tiller/config.json`.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".tiller")
            .join("config.json")
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| AgentError::io(format!("failed to read {}", path.display()), e))?;
        serde_json::from_str(&content).map_err(|e| {
            AgentError::Validation(format!("invalid config {}: {e}", path.display()))
        })
    }

    /// Write to `path`, creating the parent directory.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AgentError::io(format!("failed to create {}", parent.display()), e))?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| AgentError::Validation(format!("failed to encode config: {e}")))?;
        std::fs::write(path, json)
            .map_err(|e| AgentError::io(format!("failed to write {}", path.display()), e))?;
        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Apply a key from the environment, if one is set and non-empty.
    pub fn with_env_key(mut self, key: Option<String>) -> Self {
        if let Some(key) = key.filter(|k| !k.trim().is_empty()) {
            self.api_key = key;
        }
        self
    }
}

// ── Session settings ──────────────────────────────────────────────────

/// Settings for one interactive session.
#[derive(Debug, Clone)]
pub struct CodeConfig {
    pub connection: ConnectionConfig,
    /// Working directory for file and command tools.
    pub workdir: PathBuf,
    /// Maximum model requests per turn. Default: `50`.
    pub max_steps: u32,
    /// Maximum tokens per model response. `0` leaves it to the endpoint.
    pub max_tokens: u32,
    /// Sampling temperature. Default: `0.2`.
    pub temperature: f32,
    /// Initial auto-compact flag.
    pub auto_compact: bool,
    /// Per-call tool timeout, also the `run_command` process timeout.
    pub command_timeout: Duration,
    /// Keep file tools inside `workdir`.
    pub confine_paths: bool,
}

impl Default for CodeConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            workdir: PathBuf::from("."),
            max_steps: 50,
            max_tokens: 0,
            temperature: 0.2,
            auto_compact: true,
            command_timeout: DEFAULT_TOOL_TIMEOUT,
            confine_paths: true,
        }
    }
}

impl CodeConfig {
    /// Build an [`AgentConfig`] with the coding system prompt.
    pub fn build_agent_config(&self) -> AgentConfig {
        AgentConfig::new(self.connection.model.clone(), coding_system_prompt(&self.workdir))
            .with_max_steps(self.max_steps)
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature)
            .with_context_budget(self.connection.context_limit)
            .with_auto_compact(self.auto_compact)
    }

    /// Build a [`ToolDispatcher`] rooted at the working directory.
    pub fn build_dispatcher(&self) -> ToolDispatcher {
        let config = DispatcherConfig::default()
            .with_timeout(self.command_timeout)
            .with_confinement(self.confine_paths);
        ToolDispatcher::new(&self.workdir, config)
    }
}
