//! The trimming policy: derives the outgoing context window from canonical
//! history.
//!
//! Steps run in a fixed order:
//!
//! 1. **Retention** keeps only the newest `max_messages` messages.
//! 2. **Tool-result compression** keeps the first and last lines of long tool
//!    output around a single elision marker. Tool results at the head of the
//!    window whose request fell off are then relabelled as user notes so the
//!    window stays well-formed.
//! 3. **Old-reply truncation** shortens assistant text (and bulky tool-call
//!    arguments) once the reply is more than `old_reply_age` turns old.
//! 4. **Thinking exclusion** strips inline `<think>` spans from assistant
//!    content.
//!
//! [`TrimPolicy::apply`] is pure: the same input always yields byte-identical
//! output, and applying it to its own output changes nothing. The harness
//! writes the result back into the session, which makes every rewrite
//! permanent.

use crate::tools::ToolName;
use crate::{Message, MessageRole, split_thinking};
use serde_json::Value;

/// Prefix given to tool results whose originating request was dropped.
pub const ORPHAN_RESULT_PREFIX: &str = "[earlier tool result] ";

/// Suffix appended to truncated assistant replies.
pub const TRUNCATION_SUFFIX: &str = "…[truncated]";

/// Configuration for the trimming policy. Defaults match the documented
/// window: 40 messages, 40-line compression threshold keeping 10 + 10 lines,
/// and 500-character replies after 6 turns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimPolicy {
    /// Number of most recent messages kept in the window.
    pub max_messages: usize,
    /// Tool results with more lines than this are compressed.
    pub compress_threshold_lines: usize,
    /// Lines kept at each end of a compressed tool result.
    pub keep_lines: usize,
    /// Assistant replies older than this many turns are truncated.
    pub old_reply_age: usize,
    /// Maximum characters of an old assistant reply, suffix included.
    pub old_reply_chars: usize,
    /// `write_file` content longer than this is replaced by a size note in
    /// old tool calls.
    pub old_write_chars: usize,
    /// `edit_file` find/replace strings in old tool calls are cut to this.
    pub old_edit_chars: usize,
}

impl Default for TrimPolicy {
    fn default() -> Self {
        Self {
            max_messages: 40,
            compress_threshold_lines: 40,
            keep_lines: 10,
            old_reply_age: 6,
            old_reply_chars: 500,
            old_write_chars: 200,
            old_edit_chars: 60,
        }
    }
}

/// What a single application of the policy changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrimReport {
    /// Messages dropped by retention.
    pub dropped: usize,
    /// In-place rewrites (relabels, compressions, truncations, thinking strips).
    pub rewrites: usize,
}

impl TrimReport {
    pub fn is_empty(&self) -> bool {
        self.dropped == 0 && self.rewrites == 0
    }
}

impl TrimPolicy {
    /// Produce the outgoing window for `history`.
    pub fn apply(&self, history: &[Message]) -> Vec<Message> {
        self.apply_with_report(history).0
    }

    /// Produce the outgoing window and a report of what changed.
    pub fn apply_with_report(&self, history: &[Message]) -> (Vec<Message>, TrimReport) {
        let start = history.len().saturating_sub(self.max_messages);
        let mut window: Vec<Message> = history.iter().skip(start).cloned().collect();
        let mut report = TrimReport {
            dropped: start,
            rewrites: 0,
        };

        for msg in window.iter_mut().filter(|m| m.role == MessageRole::Tool) {
            if let Some(compressed) =
                compress_lines(msg.text(), self.compress_threshold_lines, self.keep_lines)
            {
                msg.content = Some(compressed);
                report.rewrites += 1;
            }
        }

        // After compression, so an orphan is never carried at full length.
        report.rewrites += relabel_orphan_results(&mut window);

        let ages = turn_ages(&window);
        for (msg, age) in window.iter_mut().zip(ages) {
            if msg.role == MessageRole::Assistant
                && age > self.old_reply_age
                && self.truncate_old_reply(msg)
            {
                report.rewrites += 1;
            }
        }

        for msg in window.iter_mut().filter(|m| m.role == MessageRole::Assistant) {
            if strip_thinking(msg) {
                report.rewrites += 1;
            }
        }

        (window, report)
    }

    /// Truncate an old assistant message in place. Returns whether anything
    /// changed.
    fn truncate_old_reply(&self, msg: &mut Message) -> bool {
        let mut changed = false;
        if let Some(cut) = truncate_chars(msg.text(), self.old_reply_chars) {
            msg.content = Some(cut);
            changed = true;
        }
        if let Some(calls) = msg.tool_calls.as_mut() {
            for call in calls {
                let shrunk = self.shrink_arguments(&call.function.name, &call.function.arguments);
                if let Some(args) = shrunk {
                    call.function.arguments = args;
                    changed = true;
                }
            }
        }
        changed
    }

    /// Compress bulky arguments of an old tool call. Returns the new argument
    /// string only when something changed.
    fn shrink_arguments(&self, tool: &str, arguments: &str) -> Option<String> {
        let name = ToolName::parse(tool)?;
        let Ok(Value::Object(mut args)) = serde_json::from_str::<Value>(arguments) else {
            return None;
        };
        let mut changed = false;
        match name {
            ToolName::WriteFile => {
                if let Some(Value::String(content)) = args.get("content") {
                    let n = content.chars().count();
                    if n > self.old_write_chars {
                        let note = format!("[{n} chars written]");
                        args.insert("content".into(), Value::String(note));
                        changed = true;
                    }
                }
            }
            ToolName::EditFile => {
                for key in ["find", "replace", "old_str", "new_str"] {
                    if let Some(Value::String(s)) = args.get(key)
                        && let Some(cut) = cut_chars(s, self.old_edit_chars)
                    {
                        args.insert(key.into(), Value::String(cut));
                        changed = true;
                    }
                }
            }
            _ => {}
        }
        if !changed {
            return None;
        }
        serde_json::to_string(&Value::Object(args)).ok()
    }
}

/// Relabel tool results at the head of the window that have no preceding
/// request. Returns the number relabelled.
fn relabel_orphan_results(window: &mut [Message]) -> usize {
    let mut count = 0;
    for msg in window.iter_mut() {
        if msg.role != MessageRole::Tool {
            break;
        }
        *msg = Message::user(format!("{ORPHAN_RESULT_PREFIX}{}", msg.text()));
        count += 1;
    }
    count
}

/// For each message, the number of user messages that come after it.
fn turn_ages(window: &[Message]) -> Vec<usize> {
    let mut ages = vec![0; window.len()];
    let mut users_after = 0;
    for (i, msg) in window.iter().enumerate().rev() {
        ages[i] = users_after;
        if msg.role == MessageRole::User {
            users_after += 1;
        }
    }
    ages
}

/// Strip inline thinking from assistant content. Returns whether anything
/// changed.
fn strip_thinking(msg: &mut Message) -> bool {
    let (visible, thinking) = split_thinking(msg.text());
    if thinking.is_none() && visible == msg.text() {
        return false;
    }
    msg.content = (!visible.is_empty()).then_some(visible);
    true
}

/// Keep the first and last `keep` lines of `text` when it has more than
/// `threshold` lines. Returns `None` when the text is short enough.
///
/// The output has `2 * keep + 1` lines, so it is a fixed point as long as
/// `threshold >= 2 * keep + 1`.
pub fn compress_lines(text: &str, threshold: usize, keep: usize) -> Option<String> {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() <= threshold || lines.len() <= keep * 2 + 1 {
        return None;
    }
    let elided = lines.len() - keep * 2;
    let mut out: Vec<String> = Vec::with_capacity(keep * 2 + 1);
    out.extend(lines.iter().take(keep).map(|l| l.to_string()));
    out.push(format!("[... {elided} lines elided ...]"));
    out.extend(lines.iter().skip(lines.len() - keep).map(|l| l.to_string()));
    Some(out.join("\n"))
}

/// Truncate to at most `max_chars` characters including
/// [`TRUNCATION_SUFFIX`]. Returns `None` when no truncation is needed.
pub fn truncate_chars(text: &str, max_chars: usize) -> Option<String> {
    if text.chars().count() <= max_chars {
        return None;
    }
    let keep = max_chars.saturating_sub(TRUNCATION_SUFFIX.chars().count());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(TRUNCATION_SUFFIX);
    Some(out)
}

/// Cut to at most `max_chars` characters, ending in `...`.
fn cut_chars(text: &str, max_chars: usize) -> Option<String> {
    if text.chars().count() <= max_chars {
        return None;
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    out.push_str("...");
    Some(out)
}
