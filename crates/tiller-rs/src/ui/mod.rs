//! Observer state for rendering turn progress.
//!
//! Plain data only, no terminal dependencies:
//!
//! ```text
//! Harness ──events──▶ UiEventHandler ──writes──▶ Arc<Mutex<UiState>> ◀──reads── ticker
//! ```
//!
//! [`event_handler::UiEventHandler`] is the only writer. Front ends read
//! snapshots to draw the status ticker and the context meter; they never
//! mutate the session through it.

pub mod event_handler;

use crate::tools::ToolName;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Cells in the context meter bar.
pub const METER_WIDTH: usize = 20;

/// Usage fraction where the meter turns from green to yellow.
pub const METER_YELLOW_AT: f64 = 0.5;
/// Usage fraction where the meter turns red.
pub const METER_RED_AT: f64 = 0.8;

// ── UiState ───────────────────────────────────────────────────────────

/// Turn progress shared between the loop and a front end.
#[derive(Debug, Clone)]
pub struct UiState {
    pub phase: String,
    pub step: u32,
    pub max_steps: u32,
    /// Tool calls started this turn.
    pub tool_count: u32,
    /// Prompt plus completion tokens this turn.
    pub tokens: u64,
    /// Context usage fraction of the last outgoing window.
    pub context_pct: f64,
    pub turn_started: Option<Instant>,
    /// `true` while a turn is in progress.
    pub running: bool,
    /// What the running tool is doing, e.g. `editing src/main.rs`.
    pub activity: Option<String>,
    pub compactions: u32,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            phase: "Idle".into(),
            step: 0,
            max_steps: 0,
            tool_count: 0,
            tokens: 0,
            context_pct: 0.0,
            turn_started: None,
            running: false,
            activity: None,
            compactions: 0,
        }
    }
}

impl UiState {
    /// Time since the turn started, or zero when idle.
    pub fn elapsed(&self) -> Duration {
        self.turn_started.map(|t| t.elapsed()).unwrap_or_default()
    }

    /// One-line ticker text: `working (12s • 3 actions • 4.1k tokens • editing src/main.rs)`.
    pub fn status_line(&self) -> String {
        let mut parts = vec![
            format!("{}s", self.elapsed().as_secs()),
            format!(
                "{} action{}",
                self.tool_count,
                if self.tool_count == 1 { "" } else { "s" }
            ),
            format!("{} tokens", format_tokens(self.tokens)),
        ];
        if let Some(activity) = &self.activity {
            parts.push(activity.clone());
        }
        format!("working ({})", parts.join(" \u{2022} "))
    }
}

// ── Convenience Updaters ──────────────────────────────────────────────

/// Lock the shared state mutex and run a closure on the guard.
/// Silently ignores poisoned locks.
macro_rules! with_state {
    ($state:expr, |$s:ident| $body:block) => {
        if let Ok(mut $s) = $state.lock() {
            $body
        }
    };
}

/// Reset per-turn counters and start the timer.
pub fn begin_turn(state: &Arc<Mutex<UiState>>) {
    with_state!(state, |s| {
        s.phase = "Thinking".into();
        s.step = 0;
        s.tool_count = 0;
        s.tokens = 0;
        s.activity = None;
        s.turn_started = Some(Instant::now());
        s.running = true;
    });
}

pub fn update_phase(state: &Arc<Mutex<UiState>>, phase: &str) {
    with_state!(state, |s| { s.phase = phase.to_string() });
}

/// Update the step counter and context fraction.
pub fn update_step(state: &Arc<Mutex<UiState>>, step: u32, max: u32, ctx_pct: f64) {
    with_state!(state, |s| {
        s.step = step;
        s.max_steps = max;
        s.context_pct = ctx_pct;
        s.activity = None;
    });
}

/// Record that a tool started.
pub fn record_tool_start(state: &Arc<Mutex<UiState>>, name: &str, arguments: &str) {
    let activity = activity_label(name, arguments);
    with_state!(state, |s| {
        s.tool_count += 1;
        s.phase = format!("Tool: {name}");
        s.activity = Some(activity);
    });
}

pub fn add_tokens(state: &Arc<Mutex<UiState>>, tokens: u64) {
    with_state!(state, |s| { s.tokens += tokens });
}

pub fn set_compactions(state: &Arc<Mutex<UiState>>, count: u32) {
    with_state!(state, |s| { s.compactions = count });
}

/// Stop the timer; counters stay readable for the summary line.
pub fn finish_turn(state: &Arc<Mutex<UiState>>, phase: &str) {
    with_state!(state, |s| {
        s.phase = phase.to_string();
        s.running = false;
        s.activity = None;
    });
}

// ── Activity and meter helpers ────────────────────────────────────────

/// Describe a tool call for the ticker: `editing src/main.rs`, `running cargo test`.
pub fn activity_label(name: &str, arguments: &str) -> String {
    let Some(tool) = ToolName::parse(name) else {
        return format!("calling {name}");
    };
    let args: serde_json::Value = serde_json::from_str(arguments).unwrap_or_default();
    let key = match tool {
        ToolName::RunCommand => "command",
        _ => "path",
    };
    match args.get(key).and_then(|v| v.as_str()) {
        Some(target) => {
            let short: String = target.chars().take(40).collect();
            let ellipsis = if target.chars().count() > 40 { "..." } else { "" };
            format!("{} {short}{ellipsis}", tool.activity())
        }
        None => tool.activity().to_string(),
    }
}

/// Compact token count: `950`, `4.1k`, `1.2M`.
pub fn format_tokens(tokens: u64) -> String {
    if tokens >= 1_000_000 {
        format!("{:.1}M", tokens as f64 / 1_000_000.0)
    } else if tokens >= 1_000 {
        format!("{:.1}k", tokens as f64 / 1_000.0)
    } else {
        tokens.to_string()
    }
}

/// Colour band of the context meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterBand {
    Green,
    Yellow,
    Red,
}

impl MeterBand {
    pub fn for_usage(pct: f64) -> Self {
        if pct < METER_YELLOW_AT {
            MeterBand::Green
        } else if pct < METER_RED_AT {
            MeterBand::Yellow
        } else {
            MeterBand::Red
        }
    }
}

/// Filled cells of a [`METER_WIDTH`]-cell bar for a usage fraction.
pub fn meter_cells(pct: f64) -> usize {
    let filled = (pct.clamp(0.0, 1.0) * METER_WIDTH as f64).round() as usize;
    filled.min(METER_WIDTH)
}

/// The meter as plain text, e.g. `[██████░░░░░░░░░░░░░░] 31%`.
pub fn meter_bar(pct: f64) -> String {
    let filled = meter_cells(pct);
    format!(
        "[{}{}] {:.0}%",
        "\u{2588}".repeat(filled),
        "\u{2591}".repeat(METER_WIDTH - filled),
        pct * 100.0
    )
}

// ── Tests ─────────────────────────────────────────────────────────────
