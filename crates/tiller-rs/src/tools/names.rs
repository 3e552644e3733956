//! The closed set of tools the model may call.
//!
//! The model names a tool with a string; [`ToolName::parse`] is the only
//! place that string is interpreted. Anything it does not recognise is a
//! protocol fault, never a dynamic lookup.

use std::fmt;

pub const READ_FILE: &str = "read_file";
pub const WRITE_FILE: &str = "write_file";
pub const EDIT_FILE: &str = "edit_file";
pub const LIST_FILES: &str = "list_files";
pub const RUN_COMMAND: &str = "run_command";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    ReadFile,
    WriteFile,
    EditFile,
    ListFiles,
    RunCommand,
}

impl ToolName {
    /// Every tool, in the order definitions are offered to the model.
    pub const ALL: [ToolName; 5] = [
        ToolName::ReadFile,
        ToolName::WriteFile,
        ToolName::EditFile,
        ToolName::ListFiles,
        ToolName::RunCommand,
    ];

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            READ_FILE => Some(ToolName::ReadFile),
            WRITE_FILE => Some(ToolName::WriteFile),
            EDIT_FILE => Some(ToolName::EditFile),
            LIST_FILES => Some(ToolName::ListFiles),
            RUN_COMMAND => Some(ToolName::RunCommand),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ToolName::ReadFile => READ_FILE,
            ToolName::WriteFile => WRITE_FILE,
            ToolName::EditFile => EDIT_FILE,
            ToolName::ListFiles => LIST_FILES,
            ToolName::RunCommand => RUN_COMMAND,
        }
    }

    /// Present-participle label used by the status line ("editing src/main.rs").
    pub fn activity(self) -> &'static str {
        match self {
            ToolName::ReadFile => "reading",
            ToolName::WriteFile => "writing",
            ToolName::EditFile => "editing",
            ToolName::ListFiles => "listing",
            ToolName::RunCommand => "running",
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
