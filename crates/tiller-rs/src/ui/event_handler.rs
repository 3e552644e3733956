//! `EventHandler` → `UiState` bridge.
//!
//! [`UiEventHandler`] maps agent events to observer state updates. Front
//! ends compose it with their own renderers:
//!
//! ```ignore
//! let handler = CompositeEventHandler::new()
//!     .with(LoggingHandler)
//!     .with(UiEventHandler::new(ui_state.clone()))
//!     .with(console);
//! ```

use std::sync::{Arc, Mutex};

use crate::agent::events::{AgentEvent, EventHandler};

use super::{
    UiState, add_tokens, begin_turn, finish_turn, record_tool_start, set_compactions,
    update_phase, update_step,
};

/// Event handler that writes [`AgentEvent`] progress into [`UiState`].
///
/// It is the only writer of the shared state and never influences the loop.
pub struct UiEventHandler {
    state: Arc<Mutex<UiState>>,
}

impl UiEventHandler {
    pub fn new(state: Arc<Mutex<UiState>>) -> Self {
        Self { state }
    }
}

impl EventHandler for UiEventHandler {
    fn on_event(&self, event: &AgentEvent<'_>) {
        match event {
            AgentEvent::TurnStart { .. } => begin_turn(&self.state),
            AgentEvent::StepStart {
                step,
                max_steps,
                context_usage,
            } => {
                update_phase(&self.state, "Thinking");
                update_step(&self.state, *step, *max_steps, context_usage.usage_pct);
            }
            AgentEvent::ToolExecuting {
                name, arguments, ..
            } => {
                record_tool_start(&self.state, name, arguments);
            }
            AgentEvent::TokenUsage { .. } => {
                if let Some(total) = event.total_tokens() {
                    add_tokens(&self.state, total);
                }
            }
            AgentEvent::CompactionStarted { .. } => {
                update_phase(&self.state, "Compacting context");
            }
            AgentEvent::CompactionFinished { count, .. } => {
                set_compactions(&self.state, *count);
            }
            AgentEvent::Finished => finish_turn(&self.state, "Finished"),
            AgentEvent::StepLimitReached { .. } => finish_turn(&self.state, "Step limit reached"),
            AgentEvent::Cancelled => finish_turn(&self.state, "Cancelled"),
            _ => {}
        }
    }
}
