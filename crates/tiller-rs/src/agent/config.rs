//! Configuration types for the [`Harness`](super::harness::Harness).
//!
//! # Examples
//!
//! Minimal configuration, everything else at defaults:
//!
//! ```ignore
//! let config = AgentConfig::new("gpt-4o", "You are a coding assistant.");
//! ```
//!
//! Customized with builder methods:
//!
//! ```ignore
//! let config = AgentConfig::new("gpt-4o", "You are a coding assistant.")
//!     .with_max_steps(30)
//!     .with_max_tokens(4096)
//!     .with_context_budget(64_000)
//!     .with_auto_compact(false);
//! ```
//!
//! Replacing whole modules via struct fields:
//!
//! ```ignore
//! let config = AgentConfig {
//!     compaction: Toggle::disabled(),
//!     ..AgentConfig::new("gpt-4o", "You are a coding assistant.")
//! };
//! ```

use crate::context::{CompactionConfig, ContextBudget, DEFAULT_CONTEXT_WINDOW, TrimPolicy};

// ── Generic toggle ────────────────────────────────────────────────

/// Generic enabled/disabled wrapper for module configurations.
///
/// When `enabled` is `false` the module starts switched off; for compaction
/// the flag is only the initial state and `/auto` can flip it later.
#[derive(Debug, Clone, PartialEq)]
pub struct Toggle<T: Default> {
    /// Whether this module is active.
    pub enabled: bool,
    /// Module-specific configuration.
    pub config: T,
}

impl<T: Default> Toggle<T> {
    /// Create a disabled instance with default inner config.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            config: T::default(),
        }
    }
}

impl<T: Default> Default for Toggle<T> {
    fn default() -> Self {
        Self {
            enabled: true,
            config: T::default(),
        }
    }
}

/// Compaction module configuration.
pub type AgentCompactionConfig = Toggle<CompactionConfig>;

// ── Main agent config ─────────────────────────────────────────────

/// Configuration for a [`Harness`](super::harness::Harness) turn.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Model identifier (e.g. `"gpt-4o"`).
    pub model: String,
    /// Fixed system prompt sent ahead of every window.
    pub system_prompt: String,
    /// Maximum model requests per turn.
    pub max_steps: u32,
    /// Maximum tokens per model response. `0` leaves it to the endpoint.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Context budget in tokens.
    pub context_budget: usize,
    /// How the outgoing window is derived from history.
    pub trim: TrimPolicy,
    /// Automatic compaction. `enabled` is the initial auto-compact flag.
    pub compaction: AgentCompactionConfig,
}

impl AgentConfig {
    /// Create a config with a model and system prompt.
    pub fn new(model: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_prompt: system_prompt.into(),
            ..Default::default()
        }
    }

    /// Set the maximum number of model requests per turn.
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Set the maximum tokens per model response.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the context budget in tokens.
    pub fn with_context_budget(mut self, tokens: usize) -> Self {
        self.context_budget = tokens;
        self
    }

    /// Set whether auto-compaction starts enabled.
    pub fn with_auto_compact(mut self, enabled: bool) -> Self {
        self.compaction.enabled = enabled;
        self
    }

    /// Build the context accountant for this configuration.
    pub fn budget(&self) -> ContextBudget {
        ContextBudget::with_calibration(&self.system_prompt, None)
            .with_max_tokens(self.context_budget)
            .with_output_reserve(self.max_tokens as usize)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: crate::DEFAULT_MODEL.to_string(),
            system_prompt: String::new(),
            max_steps: 50,
            max_tokens: 0,
            temperature: 0.0,
            context_budget: DEFAULT_CONTEXT_WINDOW,
            trim: TrimPolicy::default(),
            compaction: AgentCompactionConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = AgentConfig::new("m", "prompt");
        assert_eq!(config.model, "m");
        assert_eq!(config.max_steps, 50);
        assert_eq!(config.context_budget, 128_000);
        assert!(config.compaction.enabled);
        assert_eq!(config.compaction.config.max_compactions, 3);
        assert_eq!(config.trim.max_messages, 40);
    }

    #[test]
    fn builders_override_defaults() {
        let config = AgentConfig::new("m", "prompt")
            .with_max_steps(5)
            .with_max_tokens(2048)
            .with_context_budget(10_000)
            .with_auto_compact(false);
        assert_eq!(config.max_steps, 5);
        assert!(!config.compaction.enabled);
        assert_eq!(config.budget().max_tokens(), 10_000);
        assert_eq!(config.budget().effective_max_tokens(), 10_000 - 2048);
    }

    #[test]
    fn toggle_disabled_keeps_default_inner() {
        let t: Toggle<CompactionConfig> = Toggle::disabled();
        assert!(!t.enabled);
        assert_eq!(t.config, CompactionConfig::default());
    }
}
