//! Per-step mechanics for [`Harness::run_turn()`](super::harness::Harness::run_turn):
//! sending the request, validating the reply, and dispatching tool calls in
//! order while honouring cancellation.

use super::config::AgentConfig;
use super::events::{AgentEvent, EventHandler};
use super::session::Session;
use crate::tools::{ToolDispatcher, ToolName, ToolResult};
use crate::{
    AgentError, ChatCompletion, ChatModel, ChatRequest, Message, Result, ToolCall, ToolDef,
    split_thinking,
};
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Diagnostic recorded for the call that was running when the user cancelled.
pub(crate) const CANCELLED_BY_USER: &str = "cancelled by user";
/// Diagnostic recorded for calls that never started because of cancellation.
pub(crate) const SKIPPED_CANCELLED: &str = "skipped, turn cancelled";

// ── Send request ──────────────────────────────────────────────────

/// Send the system prompt plus `window` with the tool definitions.
///
/// Returns `Ok(None)` when the user cancels before the reply arrives; the
/// pending request is dropped and nothing is recorded.
pub(crate) async fn send_step_request(
    model: &dyn ChatModel,
    config: &AgentConfig,
    window: &[Message],
    tools: Vec<ToolDef>,
    cancel: &CancellationToken,
) -> Result<Option<ChatCompletion>> {
    let mut messages = Vec::with_capacity(window.len() + 1);
    messages.push(Message::system(&config.system_prompt));
    messages.extend_from_slice(window);

    let request = ChatRequest {
        model: config.model.clone(),
        messages,
        max_tokens: config.max_tokens,
        temperature: config.temperature,
        tools: Some(tools),
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Ok(None),
        r = model.chat(&request) => r.map(Some),
    }
}

// ── Reply validation ──────────────────────────────────────────────

/// A model reply that passed protocol validation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ValidatedReply {
    /// Visible text with thinking removed; `None` when blank.
    pub text: Option<String>,
    /// Thinking collected from reasoning fields and inline spans.
    pub reasoning: Option<String>,
    pub calls: Vec<ToolCall>,
}

/// Check a completion before anything from it is appended to history.
///
/// Unknown tool names, missing or duplicate call ids, and replies with
/// neither text nor tool calls are protocol faults. Malformed argument JSON
/// is left for the dispatcher to report.
pub(crate) fn validate_reply(completion: ChatCompletion) -> Result<ValidatedReply> {
    let mut seen = HashSet::new();
    for call in &completion.tool_calls {
        if ToolName::parse(&call.function.name).is_none() {
            return Err(AgentError::Protocol(format!(
                "unknown tool '{}'",
                call.function.name
            )));
        }
        if call.id.trim().is_empty() {
            return Err(AgentError::Protocol(format!(
                "tool call to '{}' has no id",
                call.function.name
            )));
        }
        if !seen.insert(call.id.as_str()) {
            return Err(AgentError::Protocol(format!(
                "duplicate tool call id '{}'",
                call.id
            )));
        }
    }

    let (visible, inline_thinking) = split_thinking(completion.content.as_deref().unwrap_or(""));
    let reasoning = match (completion.reasoning, inline_thinking) {
        (Some(a), Some(b)) => Some(format!("{a}\n{b}")),
        (a, b) => a.or(b),
    }
    .filter(|r| !r.trim().is_empty());
    let text = Some(visible.trim().to_string()).filter(|t| !t.is_empty());

    if text.is_none() && completion.tool_calls.is_empty() {
        return Err(AgentError::Protocol("empty response".into()));
    }

    Ok(ValidatedReply {
        text,
        reasoning,
        calls: completion.tool_calls,
    })
}

/// Every tool message must answer a call in the assistant message before it.
pub(crate) fn check_tool_message(calls: &[ToolCall], message: &Message) -> Result<()> {
    let id = message.tool_call_id.as_deref().unwrap_or("");
    if calls.iter().any(|c| c.id == id) {
        Ok(())
    } else {
        Err(AgentError::Protocol(format!("mismatched tool_call id '{id}'")))
    }
}

// ── Tool execution ────────────────────────────────────────────────

/// Outcome of dispatching one assistant message's tool calls.
#[derive(Debug, Default)]
pub(crate) struct DispatchSummary {
    pub executed: u32,
    pub touched: Vec<String>,
    pub cancelled: bool,
}

/// Dispatch `calls` strictly in order, appending each tool message to the
/// session as soon as its result is known.
///
/// On cancellation the running call is recorded as cancelled and the rest as
/// skipped, so every call in the assistant message still gets its result.
pub(crate) async fn dispatch_tool_calls(
    tools: &ToolDispatcher,
    handler: &dyn EventHandler,
    session: &mut Session,
    calls: &[ToolCall],
    cancel: &CancellationToken,
) -> Result<DispatchSummary> {
    let mut summary = DispatchSummary::default();

    for call in calls {
        let name = call.function.name.as_str();
        let result = if summary.cancelled || cancel.is_cancelled() {
            summary.cancelled = true;
            ToolResult::error(&call.id, SKIPPED_CANCELLED)
        } else {
            handler.on_event(&AgentEvent::ToolExecuting {
                name,
                call_id: &call.id,
                arguments: &call.function.arguments,
            });
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                r = tools.dispatch(call) => Some(r),
            };
            match outcome {
                Some(result) => {
                    summary.executed += 1;
                    result
                }
                None => {
                    warn!("Tool {name} interrupted by cancellation");
                    summary.cancelled = true;
                    ToolResult::error(&call.id, CANCELLED_BY_USER)
                }
            }
        };

        if !result.is_error()
            && let Some(path) = &result.touched
            && !summary.touched.contains(path)
        {
            summary.touched.push(path.clone());
        }

        handler.on_event(&AgentEvent::ToolResult {
            name,
            result: &result,
        });

        let message = result.to_message();
        check_tool_message(calls, &message)?;
        session.push(message);
    }

    debug!(
        "Dispatched {} of {} tool call(s){}",
        summary.executed,
        calls.len(),
        if summary.cancelled { " (cancelled)" } else { "" }
    );
    Ok(summary)
}
