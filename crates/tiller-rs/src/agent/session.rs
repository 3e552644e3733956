//! The explicit session object threaded through the loop.
//!
//! A [`Session`] owns the canonical history, the working directory, the
//! compactor (and with it the compaction count and auto-compact flag), and
//! the display mode. It lives for the process lifetime and is never
//! persisted. Only the harness and slash commands mutate it.

use crate::Message;
use crate::agent::config::AgentConfig;
use crate::context::{CompactionState, Compactor};
use std::fmt;
use std::path::{Path, PathBuf};

/// How much detail the front end shows while a turn runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayMode {
    /// A status ticker and one summary line per turn.
    #[default]
    Normal,
    /// Every tool call, result preview, and thinking preview.
    Advanced,
}

impl DisplayMode {
    pub fn toggled(self) -> Self {
        match self {
            DisplayMode::Normal => DisplayMode::Advanced,
            DisplayMode::Advanced => DisplayMode::Normal,
        }
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayMode::Normal => f.write_str("normal"),
            DisplayMode::Advanced => f.write_str("advanced"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    messages: Vec<Message>,
    working_dir: PathBuf,
    compactor: Compactor,
    display_mode: DisplayMode,
}

impl Session {
    pub fn new(working_dir: impl Into<PathBuf>, config: &AgentConfig) -> Self {
        Self {
            messages: Vec::new(),
            working_dir: working_dir.into(),
            compactor: Compactor::new(config.compaction.config.clone(), config.compaction.enabled),
            display_mode: DisplayMode::default(),
        }
    }

    /// Canonical history, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn compaction_count(&self) -> u32 {
        self.compactor.count()
    }

    pub fn compaction_state(&self) -> CompactionState {
        self.compactor.state()
    }

    pub fn auto_compact(&self) -> bool {
        self.compactor.is_enabled()
    }

    /// Flip the auto-compact flag. Returns the new value.
    pub fn toggle_auto_compact(&mut self) -> bool {
        self.compactor.toggle()
    }

    pub fn display_mode(&self) -> DisplayMode {
        self.display_mode
    }

    /// Flip the display mode. Returns the new mode.
    pub fn toggle_display_mode(&mut self) -> DisplayMode {
        self.display_mode = self.display_mode.toggled();
        self.display_mode
    }

    /// Empty the history and forget past compactions. The auto-compact flag
    /// and display mode are kept.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.compactor.reset();
    }

    pub(crate) fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Replace history with the trimmed window produced by the policy.
    pub(crate) fn replace_history(&mut self, window: Vec<Message>) {
        self.messages = window;
    }

    /// Split borrow for compaction: the compactor and the history it replaces.
    pub(crate) fn compaction_parts(&mut self) -> (&mut Compactor, &mut Vec<Message>) {
        (&mut self.compactor, &mut self.messages)
    }

    pub(crate) fn compactor_mut(&mut self) -> &mut Compactor {
        &mut self.compactor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new("/tmp/project", &AgentConfig::new("m", "sys"))
    }

    #[test]
    fn new_session_is_empty_and_enabled() {
        let s = session();
        assert!(s.messages().is_empty());
        assert_eq!(s.compaction_count(), 0);
        assert!(s.auto_compact());
        assert_eq!(s.compaction_state(), CompactionState::Enabled);
        assert_eq!(s.display_mode(), DisplayMode::Normal);
    }

    #[test]
    fn auto_compact_follows_config() {
        let s = Session::new("/tmp", &AgentConfig::new("m", "sys").with_auto_compact(false));
        assert_eq!(s.compaction_state(), CompactionState::Disabled);
    }

    #[test]
    fn clear_keeps_flags() {
        let mut s = session();
        s.push(Message::user("hi"));
        s.toggle_auto_compact();
        s.toggle_display_mode();
        s.clear();
        assert!(s.messages().is_empty());
        assert!(!s.auto_compact());
        assert_eq!(s.display_mode(), DisplayMode::Advanced);
    }

    #[test]
    fn display_mode_toggles_back_and_forth() {
        let mut s = session();
        assert_eq!(s.toggle_display_mode(), DisplayMode::Advanced);
        assert_eq!(s.toggle_display_mode(), DisplayMode::Normal);
    }
}
