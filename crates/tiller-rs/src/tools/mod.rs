//! Tool dispatch for the coding agent.
//!
//! The model can call exactly five tools, enumerated by [`ToolName`]. The
//! [`ToolDispatcher`] maps each name to its handler, validates arguments
//! against the JSON Schema of the handler's typed argument struct, applies
//! the timeout, truncates oversized output, and folds every fault into an
//! error [`ToolResult`].
//!
//! # Submodules
//!
//! - [`names`]: the closed [`ToolName`] set.
//! - [`core`]: [`ToolDispatcher`], [`DispatcherConfig`], [`ToolResult`].
//! - [`common`]: the handlers and their typed arguments.
//! - [`workspace`]: lexical path confinement to the working directory.
//! - [`command`]: the [`CommandRunner`] collaborator behind `run_command`.

pub mod command;
pub mod common;
pub mod core;
pub mod names;
pub mod workspace;

pub use command::{CommandOutput, CommandRunner, ShellRunner};
pub use core::{
    DEFAULT_MAX_RESULT_BYTES, DEFAULT_TOOL_TIMEOUT, DispatcherConfig, ToolDispatcher, ToolResult,
    ToolStatus, truncate_result, validate_tool_arguments,
};
pub use names::ToolName;
pub use workspace::Workspace;
