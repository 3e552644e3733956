//! Slash commands intercepted before input reaches the model.

use super::session::Session;
use crate::context::ContextBudget;

/// Help text listing every command.
pub const HELP_TEXT: &str = "\
Commands:
  /quit    exit (aliases: /exit, /q)
  /clear   empty the conversation and reset the compaction count
  /mode    switch between normal and advanced display
  /auto    toggle automatic context compaction
  /status  show context usage, compaction state and display mode
  /help    show this help";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Quit,
    Clear,
    Mode,
    Auto,
    Help,
    Status,
    /// A `/word` that is not a known command. Never sent to the model.
    Unknown(String),
}

/// What the front end should do after a command ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Quit,
    /// Print this line and return to the prompt.
    Reply(String),
}

impl SlashCommand {
    /// Parse a line of user input. Returns `None` when it is not a command.
    ///
    /// Matching is case-insensitive and ignores anything after the command
    /// word.
    pub fn parse(input: &str) -> Option<Self> {
        let rest = input.trim().strip_prefix('/')?;
        let word = rest.split_whitespace().next().unwrap_or("");
        let cmd = match word.to_ascii_lowercase().as_str() {
            "quit" | "exit" | "q" => SlashCommand::Quit,
            "clear" => SlashCommand::Clear,
            "mode" => SlashCommand::Mode,
            "auto" => SlashCommand::Auto,
            "help" | "?" => SlashCommand::Help,
            "status" => SlashCommand::Status,
            _ => SlashCommand::Unknown(format!("/{word}")),
        };
        Some(cmd)
    }

    /// Apply the command to the session.
    pub fn apply(&self, session: &mut Session, budget: &ContextBudget) -> CommandOutcome {
        let reply = match self {
            SlashCommand::Quit => return CommandOutcome::Quit,
            SlashCommand::Clear => {
                session.clear();
                "Conversation cleared.".to_string()
            }
            SlashCommand::Mode => {
                let mode = session.toggle_display_mode();
                format!("Display mode: {mode}")
            }
            SlashCommand::Auto => {
                if session.toggle_auto_compact() {
                    "Auto-compaction enabled.".to_string()
                } else {
                    "Auto-compaction disabled.".to_string()
                }
            }
            SlashCommand::Help => HELP_TEXT.to_string(),
            SlashCommand::Status => {
                let usage = budget.estimate_usage(session.messages());
                format!(
                    "{} | {} messages | compaction: {} ({} used) | mode: {}",
                    usage.to_log_string(),
                    session.messages().len(),
                    session.compaction_state(),
                    session.compaction_count(),
                    session.display_mode()
                )
            }
            SlashCommand::Unknown(word) => {
                format!("Unknown command {word}. Type /help for a list.")
            }
        };
        CommandOutcome::Reply(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Message;
    use crate::agent::config::AgentConfig;
    use crate::agent::session::DisplayMode;
    use crate::context::CompactionState;

    fn setup() -> (Session, ContextBudget) {
        let config = AgentConfig::new("m", "sys");
        (Session::new("/tmp", &config), config.budget())
    }

    #[test]
    fn parses_aliases_case_insensitively() {
        assert_eq!(SlashCommand::parse("/quit"), Some(SlashCommand::Quit));
        assert_eq!(SlashCommand::parse("/EXIT"), Some(SlashCommand::Quit));
        assert_eq!(SlashCommand::parse("  /q  "), Some(SlashCommand::Quit));
        assert_eq!(SlashCommand::parse("/Clear now"), Some(SlashCommand::Clear));
        assert_eq!(SlashCommand::parse("/mode"), Some(SlashCommand::Mode));
        assert_eq!(SlashCommand::parse("/auto"), Some(SlashCommand::Auto));
    }

    #[test]
    fn plain_text_is_not_a_command() {
        assert_eq!(SlashCommand::parse("create hello.py"), None);
        assert_eq!(SlashCommand::parse(""), None);
    }

    #[test]
    fn unknown_command_is_reported() {
        let cmd = SlashCommand::parse("/deploy prod").unwrap();
        assert_eq!(cmd, SlashCommand::Unknown("/deploy".into()));
        let (mut session, budget) = setup();
        let CommandOutcome::Reply(text) = cmd.apply(&mut session, &budget) else {
            panic!("expected a reply");
        };
        assert!(text.contains("Unknown command /deploy"));
        assert!(session.messages().is_empty());
    }

    #[test]
    fn clear_empties_history() {
        let (mut session, budget) = setup();
        session.push(Message::user("hi"));
        SlashCommand::Clear.apply(&mut session, &budget);
        assert!(session.messages().is_empty());
        assert_eq!(session.compaction_count(), 0);
    }

    #[test]
    fn auto_and_mode_toggle() {
        let (mut session, budget) = setup();
        assert_eq!(
            SlashCommand::Auto.apply(&mut session, &budget),
            CommandOutcome::Reply("Auto-compaction disabled.".into())
        );
        assert_eq!(session.compaction_state(), CompactionState::Disabled);
        SlashCommand::Mode.apply(&mut session, &budget);
        assert_eq!(session.display_mode(), DisplayMode::Advanced);
    }

    #[test]
    fn status_mentions_state() {
        let (mut session, budget) = setup();
        let CommandOutcome::Reply(text) = SlashCommand::Status.apply(&mut session, &budget) else {
            panic!("expected a reply");
        };
        assert!(text.contains("compaction: enabled (0 used)"));
        assert!(text.contains("mode: normal"));
    }

    #[test]
    fn quit_returns_quit() {
        let (mut session, budget) = setup();
        assert_eq!(SlashCommand::Quit.apply(&mut session, &budget), CommandOutcome::Quit);
    }
}
