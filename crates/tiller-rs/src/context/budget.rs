//! Context accounting: estimates how much of the model's context window the
//! outgoing messages occupy.
//!
//! The estimate is a deterministic size proxy (characters divided by a
//! chars-per-token ratio) rather than a real tokenizer count. It is
//! recomputed before every send and drives both the live context meter and
//! the [`Compactor`](super::Compactor) trigger.

use crate::Message;

/// Default characters per token (conservative estimate for English text).
/// Most tokenizers average 3-4 chars per token; we use 3.5 as a middle ground.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 3.5;

/// Default context window size in tokens.
pub const DEFAULT_CONTEXT_WINDOW: usize = 128_000;

/// Fixed per-message overhead in characters (role, ids, framing).
const MESSAGE_OVERHEAD_CHARS: usize = 16;

/// Estimates context usage against a configured token budget.
///
/// # Example
///
/// ```ignore
/// let budget = ContextBudget::with_calibration("You are a coding agent.", None)
///     .with_max_tokens(128_000)
///     .with_output_reserve(4096);
///
/// let usage = budget.estimate_usage(&messages);
/// println!("{}", usage.to_log_string());
/// ```
#[derive(Debug, Clone)]
pub struct ContextBudget {
    /// Maximum context window in tokens.
    max_tokens: usize,
    /// Tokens reserved for model output (per-response token limit).
    output_reserve: usize,
    /// Size of the system prompt in characters.
    system_prompt_chars: usize,
    /// Characters per token ratio (calibrated or default).
    chars_per_token: f64,
}

impl ContextBudget {
    /// Create a budget with a calibrated chars-per-token ratio. Pass `None`
    /// to use [`DEFAULT_CHARS_PER_TOKEN`].
    pub fn with_calibration(system_prompt: &str, calibrated_cpt: Option<f64>) -> Self {
        let cpt = calibrated_cpt
            .filter(|c| *c > 0.0)
            .unwrap_or(DEFAULT_CHARS_PER_TOKEN);
        Self {
            max_tokens: DEFAULT_CONTEXT_WINDOW,
            output_reserve: 0,
            system_prompt_chars: system_prompt.len(),
            chars_per_token: cpt,
        }
    }

    /// Override the context window size (in tokens).
    pub fn with_max_tokens(mut self, max: usize) -> Self {
        self.max_tokens = max;
        self
    }

    /// Set tokens reserved for model output (the per-response max_tokens limit).
    pub fn with_output_reserve(mut self, tokens: usize) -> Self {
        self.output_reserve = tokens;
        self
    }

    /// Return the maximum context window size in tokens.
    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Effective context window: `max_tokens` minus the output reserve.
    pub fn effective_max_tokens(&self) -> usize {
        self.max_tokens.saturating_sub(self.output_reserve)
    }

    /// Estimate the tokens consumed by the system prompt plus `messages`.
    ///
    /// Counts message text, tool call names and argument strings, and a
    /// small fixed overhead per message. Adding a message never lowers the
    /// estimate; dropping or shortening one always does.
    pub fn estimate_usage(&self, messages: &[Message]) -> ContextUsage {
        let total_chars = self.system_prompt_chars
            + messages.iter().map(message_chars).sum::<usize>();

        let estimated_tokens = (total_chars as f64 / self.chars_per_token).ceil() as usize;
        let effective = self.effective_max_tokens();
        let usage_pct = if effective > 0 {
            estimated_tokens as f64 / effective as f64
        } else {
            1.0
        };

        ContextUsage {
            estimated_tokens,
            max_tokens: self.max_tokens,
            usage_pct,
        }
    }
}

fn message_chars(msg: &Message) -> usize {
    let calls: usize = msg
        .calls()
        .iter()
        .map(|c| c.id.len() + c.function.name.len() + c.function.arguments.len())
        .sum();
    MESSAGE_OVERHEAD_CHARS + msg.text().len() + calls
}

/// Snapshot of context usage at a point in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContextUsage {
    /// Estimated tokens consumed.
    pub estimated_tokens: usize,
    /// Maximum context window.
    pub max_tokens: usize,
    /// Usage as a fraction (0.0 to 1.0+).
    pub usage_pct: f64,
}

impl ContextUsage {
    /// Format as a short log-friendly string.
    pub fn to_log_string(&self) -> String {
        format!(
            "context: ~{} tokens ({:.0}% of {})",
            self.estimated_tokens,
            self.usage_pct * 100.0,
            self.max_tokens,
        )
    }
}
