//! Convenience re-exports for common `tiller-rs` types.
//!
//! ```ignore
//! use tiller_rs::prelude::*;
//! ```
//!
//! Covers the client, [`Message`] constructors, the [`Harness`] with its
//! config and session, event handlers, and the tool dispatcher. Trimming and
//! compaction internals are left out; import those from [`crate::context`].

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{
    AgentError, ChatClient, ChatCompletion, ChatModel, ChatRequest, Message, Result, ToolCall,
};

// ── Agent runtime ───────────────────────────────────────────────────
pub use crate::agent::{
    AgentConfig, AgentEvent, CommandOutcome, CompositeEventHandler, DisplayMode, EventHandler,
    FnEventHandler, Harness, LoggingHandler, NoopHandler, Session, SlashCommand, TurnOutcome,
    TurnResult,
};

// ── Context management ──────────────────────────────────────────────
pub use crate::context::{CompactionState, ContextBudget, ContextUsage};

// ── Tools ───────────────────────────────────────────────────────────
pub use crate::tools::{DispatcherConfig, ToolDispatcher, ToolName, ToolResult};

// ── UI state ────────────────────────────────────────────────────────
pub use crate::ui::UiState;
pub use crate::ui::event_handler::UiEventHandler;
