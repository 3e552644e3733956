//! Agent harness: one user turn of the tool-use loop.
//!
//! The [`Harness`] appends the user message, derives the outgoing window
//! with the [`TrimPolicy`](crate::context::TrimPolicy), compacts when the
//! window crosses the usage threshold, sends the window to the model,
//! executes any returned tool calls through the [`ToolDispatcher`], and
//! repeats until the model answers with text, the step limit is reached,
//! or the user cancels.
//!
//! Callers observe the loop via [`EventHandler`] events.

use super::config::AgentConfig;
use super::events::{AgentEvent, EventHandler, NoopHandler, TurnOutcome, TurnResult};
use super::execution::{dispatch_tool_calls, send_step_request, validate_reply};
use super::session::Session;
use crate::context::{CompactionOutcome, ContextBudget, ContextUsage};
use crate::tools::ToolDispatcher;
use crate::{ChatModel, Message, Result};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

// ── Harness ────────────────────────────────────────────────────────

/// The agentic tool-use loop.
///
/// ```ignore
/// let client = ChatClient::new(endpoint, api_key)?;
/// let tools = ToolDispatcher::new(&workdir, DispatcherConfig::default());
/// let config = AgentConfig::new("gpt-4o", SYSTEM_PROMPT);
/// let mut session = Session::new(&workdir, &config);
///
/// let result = Harness::new(&client, &tools, &config)
///     .run_turn(&mut session, "create hello.py", &CancellationToken::new())
///     .await?;
/// ```
///
/// # Lifetimes
///
/// `Harness<'a>` borrows the model, dispatcher, config, and event handler.
/// Bind the handler to a `let` before building the harness so it outlives
/// the `.run_turn()` call.
pub struct Harness<'a> {
    model: &'a dyn ChatModel,
    tools: &'a ToolDispatcher,
    config: &'a AgentConfig,
    budget: ContextBudget,
    event_handler: &'a dyn EventHandler,
}

impl<'a> Harness<'a> {
    pub fn new(model: &'a dyn ChatModel, tools: &'a ToolDispatcher, config: &'a AgentConfig) -> Self {
        Self {
            model,
            tools,
            config,
            budget: config.budget(),
            event_handler: &NoopHandler,
        }
    }

    /// Attach an event handler.
    pub fn with_event_handler(mut self, handler: &'a dyn EventHandler) -> Self {
        self.event_handler = handler;
        self
    }

    /// Run one user turn against `session`.
    ///
    /// Returns `Err` only for network, protocol, and state faults. The step
    /// in flight is discarded; messages committed earlier in the turn stay.
    pub async fn run_turn(
        &self,
        session: &mut Session,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnResult> {
        let started = Instant::now();
        let mut tally = TurnTally::default();
        let max_steps = self.config.max_steps;

        session.compactor_mut().begin_turn();
        self.emit(&AgentEvent::TurnStart { prompt });
        session.push(Message::user(prompt));

        loop {
            if cancel.is_cancelled() {
                return Ok(self.cancelled(tally, started));
            }
            if tally.steps >= max_steps {
                info!("Step limit reached ({max_steps})");
                self.emit(&AgentEvent::StepLimitReached { max_steps });
                return Ok(tally.into_result(TurnOutcome::StepLimit, None, started));
            }

            let Some(usage) = self.prepare_window(session, cancel).await? else {
                return Ok(self.cancelled(tally, started));
            };

            tally.steps += 1;
            self.emit(&AgentEvent::StepStart {
                step: tally.steps,
                max_steps,
                context_usage: &usage,
            });

            let sent = send_step_request(
                self.model,
                self.config,
                session.messages(),
                self.tools.definitions(),
                cancel,
            )
            .await;
            let completion = match sent {
                Ok(Some(c)) => c,
                Ok(None) => return Ok(self.cancelled(tally, started)),
                Err(e) => {
                    warn!("Model request failed at step {}: {e}", tally.steps);
                    return Err(e);
                }
            };

            if let Some(usage) = &completion.usage {
                let prompt_tokens = usage.prompt_tokens.unwrap_or(0);
                let completion_tokens = usage.completion_tokens.unwrap_or(0);
                tally.prompt_tokens += prompt_tokens;
                tally.completion_tokens += completion_tokens;
                self.emit(&AgentEvent::TokenUsage {
                    prompt_tokens,
                    completion_tokens,
                });
            }

            let reply = validate_reply(completion)?;
            if let Some(reasoning) = &reply.reasoning {
                self.emit(&AgentEvent::Reasoning(reasoning));
            }
            if let Some(text) = &reply.text {
                self.emit(&AgentEvent::Text(text));
            }

            if reply.calls.is_empty() {
                let text = reply.text.unwrap_or_default();
                session.push(Message::assistant_text(&text));
                self.emit(&AgentEvent::Finished);
                return Ok(tally.into_result(TurnOutcome::Completed, Some(text), started));
            }

            self.emit(&AgentEvent::ToolCallsReceived {
                step: tally.steps,
                count: reply.calls.len(),
            });
            session.push(Message::assistant_tool_calls(
                reply.text,
                reply.calls.clone(),
            ));

            let dispatched =
                dispatch_tool_calls(self.tools, self.event_handler, session, &reply.calls, cancel)
                    .await?;
            tally.tool_calls += dispatched.executed;
            for path in dispatched.touched {
                if !tally.files_touched.contains(&path) {
                    tally.files_touched.push(path);
                }
            }
            if dispatched.cancelled {
                return Ok(self.cancelled(tally, started));
            }
        }
    }

    /// Trim history, then compact if the window crosses the threshold.
    ///
    /// Returns the usage of the window about to be sent, or `None` when the
    /// user cancelled during compaction.
    async fn prepare_window(
        &self,
        session: &mut Session,
        cancel: &CancellationToken,
    ) -> Result<Option<ContextUsage>> {
        self.trim(session);
        let usage = self.budget.estimate_usage(session.messages());

        if !session.compactor_mut().should_compact(&usage) {
            if session.compactor_mut().take_exhausted_notice(&usage) {
                self.emit(&AgentEvent::CompactionExhausted {
                    count: session.compaction_count(),
                });
            }
            return Ok(Some(usage));
        }

        self.emit(&AgentEvent::CompactionStarted {
            messages: session.messages().len(),
            context_usage: &usage,
        });
        let (compactor, history) = session.compaction_parts();
        match compactor
            .compact(self.model, &self.config.model, history, cancel)
            .await
        {
            Ok(CompactionOutcome::Compacted { replaced, count }) => {
                self.emit(&AgentEvent::CompactionFinished { count, replaced });
                self.trim(session);
                Ok(Some(self.budget.estimate_usage(session.messages())))
            }
            Ok(CompactionOutcome::Cancelled) => Ok(None),
            Err(e) => {
                self.emit(&AgentEvent::CompactionFailed { error: &e });
                Ok(Some(usage))
            }
        }
    }

    /// Apply the trimming policy and write the window back as history.
    fn trim(&self, session: &mut Session) {
        let (window, report) = self.config.trim.apply_with_report(session.messages());
        if !report.is_empty() {
            self.emit(&AgentEvent::Trimmed {
                dropped: report.dropped,
                rewrites: report.rewrites,
            });
        }
        session.replace_history(window);
    }

    fn cancelled(&self, tally: TurnTally, started: Instant) -> TurnResult {
        self.emit(&AgentEvent::Cancelled);
        tally.into_result(TurnOutcome::Cancelled, None, started)
    }

    fn emit(&self, event: &AgentEvent<'_>) {
        self.event_handler.on_event(event);
    }
}

/// Counters accumulated over one turn.
#[derive(Debug, Default)]
struct TurnTally {
    steps: u32,
    tool_calls: u32,
    prompt_tokens: u32,
    completion_tokens: u32,
    files_touched: Vec<String>,
}

impl TurnTally {
    fn into_result(
        self,
        outcome: TurnOutcome,
        final_text: Option<String>,
        started: Instant,
    ) -> TurnResult {
        TurnResult {
            outcome,
            final_text,
            steps: self.steps,
            tool_calls: self.tool_calls,
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            elapsed: started.elapsed(),
            files_touched: self.files_touched,
        }
    }
}
