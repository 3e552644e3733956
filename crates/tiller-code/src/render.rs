//! Console rendering: per-event output, the status ticker, and the
//! end-of-turn summary.
//!
//! Progress goes to stderr so stdout carries only the model's answers.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crossterm::style::Stylize;
use crossterm::{cursor, queue, terminal};
use tiller_rs::agent::{AgentEvent, DisplayMode, EventHandler, TurnOutcome, TurnResult};
use tiller_rs::ui::{MeterBand, UiState, format_tokens, meter_bar};

/// How long the ticker waits between redraws.
const TICK: Duration = Duration::from_secs(1);
/// Poll interval for the ticker's stop flag.
const STOP_POLL: Duration = Duration::from_millis(100);
const PREVIEW_CHARS: usize = 160;

// ── Event output ──────────────────────────────────────────────────────

/// Prints agent events for the current display mode.
///
/// Normal mode only reports compaction; the ticker covers the rest.
/// Advanced mode prints every tool call, a result preview, and a thinking
/// preview. Text the model sends alongside tool calls is held until the
/// calls arrive so the final answer is printed once, by the REPL.
pub struct ConsoleHandler {
    mode: DisplayMode,
    pending_text: Mutex<Option<String>>,
}

impl ConsoleHandler {
    pub fn new(mode: DisplayMode) -> Self {
        Self {
            mode,
            pending_text: Mutex::new(None),
        }
    }

    fn advanced(&self) -> bool {
        self.mode == DisplayMode::Advanced
    }
}

impl EventHandler for ConsoleHandler {
    fn on_event(&self, event: &AgentEvent<'_>) {
        match event {
            AgentEvent::CompactionStarted { context_usage, .. } => {
                note(&format!(
                    "compacting conversation ({:.0}% of context used)...",
                    context_usage.usage_pct * 100.0
                ));
            }
            AgentEvent::CompactionFinished { count, replaced } => {
                note(&format!(
                    "compaction {count} done: {replaced} messages replaced by a summary"
                ));
            }
            AgentEvent::CompactionFailed { error } => {
                warn_line(&format!("compaction failed, history unchanged: {error}"));
            }
            AgentEvent::CompactionExhausted { count } => {
                warn_line(&format!(
                    "context is nearly full and all {count} compactions are used; /clear to start over"
                ));
            }
            AgentEvent::Text(text) if self.advanced() => {
                if let Ok(mut pending) = self.pending_text.lock() {
                    *pending = Some(text.to_string());
                }
            }
            AgentEvent::ToolCallsReceived { .. } if self.advanced() => {
                let pending = self.pending_text.lock().ok().and_then(|mut p| p.take());
                if let Some(text) = pending {
                    clear_line();
                    eprintln!("{}", text.italic());
                }
            }
            AgentEvent::Reasoning(text) if self.advanced() => {
                clear_line();
                eprintln!("{}", format!("thinking: {}", preview(text)).dim());
            }
            AgentEvent::ToolExecuting {
                name, arguments, ..
            } if self.advanced() => {
                clear_line();
                eprintln!("{} {} {}", "\u{2192}".cyan(), name.bold(), preview(arguments).dim());
            }
            AgentEvent::ToolResult { result, .. } if self.advanced() => {
                let mark = if result.is_error() {
                    "\u{2717}".red()
                } else {
                    "\u{2713}".green()
                };
                let size = if result.original_len > result.content.len() {
                    format!(" ({} bytes, truncated)", result.original_len)
                } else {
                    String::new()
                };
                eprintln!("  {mark} {}{}", preview(&result.content), size.dim());
            }
            AgentEvent::StepLimitReached { max_steps } => {
                warn_line(&format!("stopped after {max_steps} steps without a final answer"));
            }
            _ => {}
        }
    }
}

fn note(text: &str) {
    clear_line();
    eprintln!("{}", text.dim());
}

fn warn_line(text: &str) {
    clear_line();
    eprintln!("{}", text.yellow());
}

/// First line of `text`, cut to a fixed width.
fn preview(text: &str) -> String {
    let line = text.lines().next().unwrap_or("");
    let mut out: String = line.chars().take(PREVIEW_CHARS).collect();
    if line.chars().count() > PREVIEW_CHARS || text.lines().nth(1).is_some() {
        out.push_str(" ...");
    }
    out
}

/// Erase the ticker line so the next output starts in column 0.
pub fn clear_line() {
    let mut err = std::io::stderr();
    let _ = queue!(
        err,
        cursor::MoveToColumn(0),
        terminal::Clear(terminal::ClearType::CurrentLine)
    );
    let _ = err.flush();
}

// ── Ticker ────────────────────────────────────────────────────────────

/// Background thread redrawing the status line once per second.
///
/// Reads [`UiState`] snapshots only; the agent loop stays the single writer.
pub struct Ticker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    pub fn start(state: Arc<Mutex<UiState>>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let handle = std::thread::spawn(move || {
            while !flag.load(Ordering::Relaxed) {
                let line = state
                    .lock()
                    .ok()
                    .filter(|s| s.running)
                    .map(|s| s.status_line());
                if let Some(line) = line {
                    let mut err = std::io::stderr();
                    let _ = queue!(
                        err,
                        cursor::MoveToColumn(0),
                        terminal::Clear(terminal::ClearType::CurrentLine)
                    );
                    let _ = write!(err, "{}", line.dim());
                    let _ = err.flush();
                }
                let mut waited = Duration::ZERO;
                while waited < TICK && !flag.load(Ordering::Relaxed) {
                    std::thread::sleep(STOP_POLL);
                    waited += STOP_POLL;
                }
            }
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Stop the thread and erase the status line.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
            clear_line();
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ── Summaries ─────────────────────────────────────────────────────────

/// One line per turn: outcome, duration, actions, files touched, tokens.
pub fn turn_summary(result: &TurnResult) -> String {
    let lead = match result.outcome {
        TurnOutcome::Completed => "done",
        TurnOutcome::StepLimit => "step limit",
        TurnOutcome::Cancelled => "cancelled",
    };
    let mut parts = vec![
        format!("{:.1}s", result.elapsed.as_secs_f64()),
        format!(
            "{} action{}",
            result.tool_calls,
            if result.tool_calls == 1 { "" } else { "s" }
        ),
    ];
    if !result.files_touched.is_empty() {
        parts.push(format!("files: {}", result.files_touched.join(", ")));
    }
    parts.push(format!("{} tokens", format_tokens(result.total_tokens() as u64)));
    format!("{lead} ({})", parts.join(" \u{2022} "))
}

/// The context meter, coloured by band.
pub fn context_meter(pct: f64) -> String {
    let bar = meter_bar(pct);
    let styled = match MeterBand::for_usage(pct) {
        MeterBand::Green => bar.green(),
        MeterBand::Yellow => bar.yellow(),
        MeterBand::Red => bar.red(),
    };
    format!("context {styled}")
}
