//! Events, handlers, and turn results for the [`Harness`](super::harness::Harness).
//!
//! The harness reports progress through [`AgentEvent`] variants that cover
//! one user turn from start to finish: each step, the model's text and
//! thinking, every tool dispatch, trimming, and compaction. Callers implement
//! [`EventHandler`] to render progress, update observer state, or log.
//!
//! # Choosing an event handler
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests or fire-and-forget turns |
//! | [`LoggingHandler`] | Structured logging via `tracing` |
//! | [`FnEventHandler`] | Quick closures for simple callbacks |
//! | [`CompositeEventHandler`] | Compose multiple handlers in order |
//! | [`UiEventHandler`](crate::ui::event_handler::UiEventHandler) | Feed the observer snapshot |

use crate::AgentError;
use crate::context::ContextUsage;
use crate::tools::ToolResult;
use std::time::Duration;
use tracing::{debug, info, warn};

// ── Events ─────────────────────────────────────────────────────────

/// Events emitted by the harness during a turn.
#[derive(Debug)]
pub enum AgentEvent<'a> {
    /// A new turn is starting with this user prompt.
    TurnStart { prompt: &'a str },
    /// A new step (model request) is starting.
    StepStart {
        step: u32,
        max_steps: u32,
        context_usage: &'a ContextUsage,
    },
    /// The trimming policy dropped or rewrote messages before this step.
    Trimmed { dropped: usize, rewrites: usize },
    /// The model returned text (may be alongside tool calls).
    Text(&'a str),
    /// The model returned thinking content. Never stored in history.
    Reasoning(&'a str),
    /// The model is requesting tool calls this step.
    ToolCallsReceived { step: u32, count: usize },
    /// A single tool is about to be executed.
    ToolExecuting {
        name: &'a str,
        call_id: &'a str,
        arguments: &'a str,
    },
    /// A single tool finished executing.
    ToolResult {
        name: &'a str,
        result: &'a ToolResult,
    },
    /// Token usage reported by the endpoint for this step.
    TokenUsage {
        prompt_tokens: u32,
        completion_tokens: u32,
    },
    /// Compaction is about to summarize the history.
    CompactionStarted {
        messages: usize,
        context_usage: &'a ContextUsage,
    },
    /// History was replaced with a summary.
    CompactionFinished { count: u32, replaced: usize },
    /// The summarization request failed; history is unchanged.
    CompactionFailed { error: &'a AgentError },
    /// The budget is breached but no compactions remain this session.
    CompactionExhausted { count: u32 },
    /// The model answered with final text; the turn is over.
    Finished,
    /// The turn hit the step limit without a final answer.
    StepLimitReached { max_steps: u32 },
    /// The user cancelled the turn.
    Cancelled,
}

impl AgentEvent<'_> {
    /// Extract total tokens from a `TokenUsage` event.
    pub fn total_tokens(&self) -> Option<u64> {
        if let AgentEvent::TokenUsage {
            prompt_tokens,
            completion_tokens,
        } = self
        {
            Some(*prompt_tokens as u64 + *completion_tokens as u64)
        } else {
            None
        }
    }
}

/// Handler for agent events.
///
/// # Example
///
/// ```ignore
/// struct Printer;
///
/// impl EventHandler for Printer {
///     fn on_event(&self, event: &AgentEvent<'_>) {
///         if let AgentEvent::Text(text) = event {
///             println!("{text}");
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    /// Called for each event during the turn.
    fn on_event(&self, event: &AgentEvent<'_>) {
        let _ = event;
    }
}

/// A no-op event handler.
pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// An event handler backed by a closure.
///
/// ```ignore
/// let handler = FnEventHandler::new(|event| {
///     if let AgentEvent::Text(text) = event {
///         println!("{text}");
///     }
/// });
/// ```
pub struct FnEventHandler<F>(F)
where
    F: Fn(&AgentEvent<'_>) + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&AgentEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&AgentEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &AgentEvent<'_>) {
        (self.0)(event)
    }
}

/// An event handler that delegates to multiple inner handlers in
/// registration order.
///
/// ```ignore
/// let handler = CompositeEventHandler::new()
///     .with(LoggingHandler)
///     .with_if(show_ui, UiEventHandler::new(state.clone()))
///     .with(console);
/// ```
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Add a handler to the chain.
    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Conditionally add a handler to the chain.
    pub fn with_if(self, condition: bool, handler: impl EventHandler + 'static) -> Self {
        if condition { self.with(handler) } else { self }
    }

    /// Add a handler from an `Option`. `None` is a no-op.
    pub fn with_opt(self, handler: Option<impl EventHandler + 'static>) -> Self {
        match handler {
            Some(h) => self.with(h),
            None => self,
        }
    }
}

impl Default for CompositeEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandler for CompositeEventHandler {
    fn on_event(&self, event: &AgentEvent<'_>) {
        for handler in &self.handlers {
            handler.on_event(event);
        }
    }
}

/// An event handler that logs events via `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &AgentEvent<'_>) {
        match event {
            AgentEvent::TurnStart { prompt } => {
                let preview: String = prompt.chars().take(120).collect();
                info!("Turn started: {preview}");
            }
            AgentEvent::StepStart {
                step,
                max_steps,
                context_usage,
            } => {
                info!(
                    "[step {}/{}] {}",
                    step,
                    max_steps,
                    context_usage.to_log_string()
                );
            }
            AgentEvent::Trimmed { dropped, rewrites } => {
                debug!("Trimmed history: {dropped} dropped, {rewrites} rewritten");
            }
            AgentEvent::Text(text) => {
                let preview: String = text.chars().take(200).collect();
                debug!(
                    "LLM text: {preview}{}",
                    if text.chars().count() > 200 { "..." } else { "" }
                );
            }
            AgentEvent::Reasoning(text) => {
                let preview: String = text.chars().take(200).collect();
                debug!(
                    "LLM reasoning: {preview}{}",
                    if text.chars().count() > 200 { "..." } else { "" }
                );
            }
            AgentEvent::ToolCallsReceived { step, count } => {
                debug!("{count} tool call(s) in step {step}");
            }
            AgentEvent::ToolExecuting { name, call_id, .. } => {
                debug!("Executing tool: {name} ({call_id})");
            }
            AgentEvent::ToolResult { name, result } => {
                debug!(
                    "Tool {name} {:?}: {} bytes",
                    result.status,
                    result.content.len()
                );
            }
            AgentEvent::TokenUsage {
                prompt_tokens,
                completion_tokens,
            } => {
                debug!("Tokens: prompt={prompt_tokens}, completion={completion_tokens}");
            }
            AgentEvent::CompactionStarted {
                messages,
                context_usage,
            } => {
                info!(
                    "Compacting {messages} messages ({})",
                    context_usage.to_log_string()
                );
            }
            AgentEvent::CompactionFinished { count, replaced } => {
                info!("Context compaction #{count} completed ({replaced} messages summarized)");
            }
            AgentEvent::CompactionFailed { error } => {
                warn!("Context compaction failed: {error}");
            }
            AgentEvent::CompactionExhausted { count } => {
                warn!("Context budget exceeded after {count} compactions; /clear to reset");
            }
            AgentEvent::Finished => {
                info!("Turn finished");
            }
            AgentEvent::StepLimitReached { max_steps } => {
                info!("Turn hit step limit ({max_steps})");
            }
            AgentEvent::Cancelled => {
                info!("Turn cancelled by user");
            }
        }
    }
}

// ── Turn result ────────────────────────────────────────────────────

/// How a turn ended without a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The model answered with final text.
    Completed,
    /// The step limit was reached first.
    StepLimit,
    /// The user cancelled the turn.
    Cancelled,
}

/// The result of one [`Harness::run_turn()`](super::harness::Harness::run_turn).
#[derive(Debug, Clone)]
pub struct TurnResult {
    pub outcome: TurnOutcome,
    /// The final assistant text, when the turn completed.
    pub final_text: Option<String>,
    /// Model requests made (compaction requests excluded).
    pub steps: u32,
    /// Tool calls dispatched.
    pub tool_calls: u32,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub elapsed: Duration,
    /// Files written or edited, deduplicated, in first-touch order.
    pub files_touched: Vec<String>,
}

impl TurnResult {
    /// Total tokens (prompt + completion).
    pub fn total_tokens(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }

    pub fn finished(&self) -> bool {
        self.outcome == TurnOutcome::Completed
    }
}
