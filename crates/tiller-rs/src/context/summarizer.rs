//! Summarization request builder for compaction.
//!
//! Condenses the whole history into a short transcript and asks the model
//! for a summary that can stand in for it: what the project is, what was done,
//! and what the user last asked for.

use crate::{ChatRequest, Message, MessageRole};

/// Marker at the start of the synthetic message that replaces history.
pub const SUMMARY_PREFIX: &str = "[Conversation summary]";

/// The prompt used for summarization.
const SUMMARIZATION_PROMPT: &str = "\
Summarize this conversation for context continuity. Include:
1. What the project is (language, framework, purpose) in 1-2 sentences.
2. What was accomplished in this session (files created/edited, features built).
3. What the user was last working on or asked for. Quote the final user request verbatim.
4. Any important decisions or patterns established.

Be concise. Max 300 words. This summary will be used to continue the conversation in a fresh context.";

/// Configuration for the summarization call.
#[derive(Debug, Clone, PartialEq)]
pub struct SummarizerConfig {
    /// Model to use for summarization. Falls back to the main model.
    pub model: Option<String>,
    /// Maximum tokens for the summarization response.
    pub max_summary_tokens: u32,
    /// Sampling temperature for the summarization call.
    pub temperature: f32,
    /// Number of condensed history entries included.
    pub max_entries: usize,
    /// Characters kept from each user message.
    pub user_chars: usize,
    /// Characters kept from each assistant message.
    pub assistant_chars: usize,
    /// Characters kept from each tool result.
    pub tool_chars: usize,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            model: None,
            max_summary_tokens: 500,
            temperature: 0.0,
            max_entries: 30,
            user_chars: 500,
            assistant_chars: 300,
            tool_chars: 100,
        }
    }
}

/// Builds summarization requests and the summary message they produce.
#[derive(Debug, Clone, Default)]
pub struct Summarizer {
    pub config: SummarizerConfig,
}

impl Summarizer {
    pub fn new(config: SummarizerConfig) -> Self {
        Self { config }
    }

    /// Build the summarization prompt for `history`.
    ///
    /// Returns a (system, user) pair. The user part is a condensed
    /// transcript of the newest entries; the newest user message is always
    /// included in full so the pending task survives compaction verbatim.
    pub fn build_summarization_request(&self, history: &[Message]) -> (String, String) {
        let cfg = &self.config;
        let condensed: Vec<String> = history
            .iter()
            .filter_map(|msg| {
                let text = msg.text();
                match msg.role {
                    MessageRole::User => Some(format!("[user]: {}", head(text, cfg.user_chars))),
                    MessageRole::Assistant => {
                        let mut line = format!("[assistant]: {}", head(text, cfg.assistant_chars));
                        for call in msg.calls() {
                            line.push_str(&format!(" (called {})", call.function.name));
                        }
                        Some(line)
                    }
                    MessageRole::Tool => Some(format!(
                        "[assistant]: [tool result: {}]",
                        head(text, cfg.tool_chars)
                    )),
                    MessageRole::System => None,
                }
            })
            .collect();

        let skip = condensed.len().saturating_sub(cfg.max_entries);
        let mut content = condensed
            .into_iter()
            .skip(skip)
            .collect::<Vec<_>>()
            .join("\n\n");

        if let Some(last_user) = history.iter().rev().find(|m| m.role == MessageRole::User) {
            content.push_str("\n\n=== FINAL USER REQUEST ===\n");
            content.push_str(last_user.text());
        }

        (SUMMARIZATION_PROMPT.to_string(), content)
    }

    /// Build the full chat request for summarizing `history`. No tools are
    /// offered.
    pub fn build_request(&self, main_model: &str, history: &[Message]) -> ChatRequest {
        let (system, user) = self.build_summarization_request(history);
        ChatRequest {
            model: self.summary_model(main_model).to_string(),
            messages: vec![Message::system(system), Message::user(user)],
            max_tokens: self.config.max_summary_tokens,
            temperature: self.config.temperature,
            tools: None,
        }
    }

    /// The message that replaces history after a successful summarization.
    pub fn summary_message(summary: &str) -> Message {
        Message::user(format!("{SUMMARY_PREFIX}\n{}", summary.trim()))
    }

    /// Get the model to use for summarization.
    pub fn summary_model<'a>(&'a self, main_model: &'a str) -> &'a str {
        self.config.model.as_deref().unwrap_or(main_model)
    }
}

fn head(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
