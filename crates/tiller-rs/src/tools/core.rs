//! Tool dispatch: definitions, argument validation, execution, and results.
//!
//! [`ToolDispatcher`] executes one [`ToolCall`] at a time against the
//! [`Workspace`] and a [`CommandRunner`]. It never returns an error: every
//! fault, from unknown names to timeouts, comes back as a [`ToolResult`] with
//! [`ToolStatus::Error`] so the model can see it and try something else.

use crate::tools::command::{CommandRunner, ShellRunner};
use crate::tools::common::{
    self, EditFileArgs, ListFilesArgs, ReadFileArgs, RunCommandArgs, WriteFileArgs,
};
use crate::tools::names::ToolName;
use crate::tools::workspace::Workspace;
use crate::{AgentError, Message, Result, ToolCall, ToolDef, json_schema_for};
use serde::de::DeserializeOwned;
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Maximum size (in bytes) for tool output before truncation.
pub const DEFAULT_MAX_RESULT_BYTES: usize = 30_000;

/// Default timeout for a single tool call.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Slack given to `run_command` on top of the process timeout so the
/// runner reports its own timeout first.
const COMMAND_GRACE: Duration = Duration::from_secs(2);

// ── ToolResult ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStatus {
    Ok,
    Error,
}

/// Outcome of one dispatched tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    /// Id of the call this answers.
    pub call_id: String,
    pub status: ToolStatus,
    /// Output text, or the diagnostic when `status` is `Error`.
    pub content: String,
    /// Byte length of the output before truncation.
    pub original_len: usize,
    /// Path written by `write_file` / `edit_file`, relative to the workspace.
    pub touched: Option<String>,
}

impl ToolResult {
    pub fn ok(call_id: impl Into<String>, content: String, max_bytes: usize) -> Self {
        let original_len = content.len();
        Self {
            call_id: call_id.into(),
            status: ToolStatus::Ok,
            content: truncate_result(content, max_bytes),
            original_len,
            touched: None,
        }
    }

    pub fn error(call_id: impl Into<String>, diagnostic: impl Into<String>) -> Self {
        let content = diagnostic.into();
        Self {
            call_id: call_id.into(),
            status: ToolStatus::Error,
            original_len: content.len(),
            content,
            touched: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == ToolStatus::Error
    }

    /// The text the model sees. Error diagnostics are prefixed with `Error: `.
    pub fn model_text(&self) -> String {
        match self.status {
            ToolStatus::Ok => self.content.clone(),
            ToolStatus::Error => format!("Error: {}", self.content),
        }
    }

    /// The tool message appended to history.
    pub fn to_message(&self) -> Message {
        Message::tool_result(&self.call_id, self.model_text())
    }
}

// ── DispatcherConfig ───────────────────────────────────────────────

/// Configuration for [`ToolDispatcher`].
///
/// # Example
///
/// ```ignore
/// let config = DispatcherConfig::default()
///     .with_timeout(Duration::from_secs(120))
///     .with_confinement(false);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Limit for one tool call; also the process timeout of `run_command`.
    pub timeout: Duration,
    /// Maximum result size in bytes before truncation.
    pub max_result_bytes: usize,
    /// Validate arguments against each tool's JSON Schema before running it.
    pub validate_args: bool,
    /// Reject paths that resolve outside the working directory.
    pub confine_paths: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TOOL_TIMEOUT,
            max_result_bytes: DEFAULT_MAX_RESULT_BYTES,
            validate_args: true,
            confine_paths: true,
        }
    }
}

impl DispatcherConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_result_bytes(mut self, max: usize) -> Self {
        self.max_result_bytes = max;
        self
    }

    pub fn with_arg_validation(mut self, enabled: bool) -> Self {
        self.validate_args = enabled;
        self
    }

    pub fn with_confinement(mut self, enabled: bool) -> Self {
        self.confine_paths = enabled;
        self
    }
}

// ── ToolDispatcher ─────────────────────────────────────────────────

/// Executes tool calls for one working directory.
pub struct ToolDispatcher {
    workspace: Workspace,
    config: DispatcherConfig,
    runner: Box<dyn CommandRunner>,
}

impl fmt::Debug for ToolDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDispatcher")
            .field("workspace", &self.workspace)
            .field("config", &self.config)
            .finish()
    }
}

impl ToolDispatcher {
    /// Create a dispatcher rooted at `workdir` that runs commands via `sh -c`.
    pub fn new(workdir: impl Into<PathBuf>, config: DispatcherConfig) -> Self {
        Self {
            workspace: Workspace::new(workdir, config.confine_paths),
            config,
            runner: Box::new(ShellRunner),
        }
    }

    /// Replace the command-execution collaborator.
    pub fn with_runner(mut self, runner: impl CommandRunner + 'static) -> Self {
        self.runner = Box::new(runner);
        self
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Tool definitions for the chat request, in [`ToolName::ALL`] order.
    pub fn definitions(&self) -> Vec<ToolDef> {
        ToolName::ALL.iter().map(|&name| definition(name)).collect()
    }

    /// Execute one call. Never fails: faults become error results.
    pub async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        let id = call.id.as_str();
        let Some(name) = ToolName::parse(&call.function.name) else {
            warn!("Model requested unknown tool '{}'", call.function.name);
            return ToolResult::error(id, format!("unknown tool '{}'", call.function.name));
        };
        let arguments = normalize_arguments(&call.function.arguments);

        if self.config.validate_args
            && let Err(e) = validate_tool_arguments(name, arguments)
        {
            debug!("Tool {name} rejected: {e}");
            return ToolResult::error(id, e.message());
        }

        log_tool_call(name.as_str(), arguments);
        let start = Instant::now();

        let limit = match name {
            ToolName::RunCommand => self.config.timeout + COMMAND_GRACE,
            _ => self.config.timeout,
        };
        let outcome = match tokio::time::timeout(limit, self.execute(name, arguments)).await {
            Ok(r) => r,
            Err(_) => {
                info!("Tool {name} timed out after {:.0}s", limit.as_secs_f64());
                Err(AgentError::Io(format!(
                    "{name} timed out after {}s",
                    limit.as_secs()
                )))
            }
        };

        let elapsed = start.elapsed();
        match outcome {
            Ok((content, touched)) => {
                debug!(
                    "Tool {name} completed in {:.0}ms ({} bytes)",
                    elapsed.as_secs_f64() * 1000.0,
                    content.len()
                );
                trace!(
                    "Tool {name} result preview: {}",
                    content.chars().take(300).collect::<String>()
                );
                let mut result = ToolResult::ok(id, content, self.config.max_result_bytes);
                result.touched = touched;
                result
            }
            Err(e) => {
                debug!(
                    "Tool {name} failed in {:.0}ms: {e}",
                    elapsed.as_secs_f64() * 1000.0
                );
                ToolResult::error(id, e.message())
            }
        }
    }

    /// Exhaustive mapping from tool name to handler.
    async fn execute(&self, name: ToolName, arguments: &str) -> Result<(String, Option<String>)> {
        let ws = &self.workspace;
        match name {
            ToolName::ReadFile => {
                let args: ReadFileArgs = parse_tool_args(name, arguments)?;
                Ok((common::read_file(ws, args).await?, None))
            }
            ToolName::WriteFile => {
                let args: WriteFileArgs = parse_tool_args(name, arguments)?;
                let touched = self.touched_path(&args.path);
                Ok((common::write_file(ws, args).await?, touched))
            }
            ToolName::EditFile => {
                let args: EditFileArgs = parse_tool_args(name, arguments)?;
                let touched = self.touched_path(&args.path);
                Ok((common::edit_file(ws, args).await?, touched))
            }
            ToolName::ListFiles => {
                let args: ListFilesArgs = parse_tool_args(name, arguments)?;
                Ok((common::list_files(ws, args).await?, None))
            }
            ToolName::RunCommand => {
                let args: RunCommandArgs = parse_tool_args(name, arguments)?;
                let out =
                    common::run_command(ws, self.runner.as_ref(), self.config.timeout, args)
                        .await?;
                Ok((out, None))
            }
        }
    }

    fn touched_path(&self, path: &str) -> Option<String> {
        self.workspace
            .resolve(path)
            .ok()
            .map(|p| self.workspace.display(&p))
    }
}

/// Tool definition for `name`, with the schema of its typed arguments.
pub fn definition(name: ToolName) -> ToolDef {
    let (description, parameters) = match name {
        ToolName::ReadFile => (
            "Read the full content of a file. Use list_files first if you do not know the path.",
            json_schema_for::<ReadFileArgs>(),
        ),
        ToolName::WriteFile => (
            "Create or overwrite a file with the given content. Parent directories are created.",
            json_schema_for::<WriteFileArgs>(),
        ),
        ToolName::EditFile => (
            "Replace one exact substring in a file. The 'find' text must occur exactly once; \
             include surrounding lines to make it unique.",
            json_schema_for::<EditFileArgs>(),
        ),
        ToolName::ListFiles => (
            "List a directory. Each line is 'dir  name/' or 'file name'. \
             Use depth > 1 to descend into subdirectories.",
            json_schema_for::<ListFilesArgs>(),
        ),
        ToolName::RunCommand => (
            "Run a shell command in the working directory and return its exit code, \
             stdout, and stderr. Long-running commands are killed at the timeout.",
            json_schema_for::<RunCommandArgs>(),
        ),
    };
    ToolDef::new(name.as_str(), description, parameters)
}

/// Models sometimes send an empty string for a call without arguments.
fn normalize_arguments(arguments: &str) -> &str {
    if arguments.trim().is_empty() {
        "{}"
    } else {
        arguments
    }
}

/// Validate raw JSON arguments against the tool's declared JSON Schema.
pub fn validate_tool_arguments(name: ToolName, arguments: &str) -> Result<()> {
    let args_value: serde_json::Value = serde_json::from_str(arguments).map_err(|e| {
        AgentError::Validation(format!("invalid JSON arguments for tool '{name}': {e}"))
    })?;

    let schema = definition(name).function.parameters;
    let Ok(validator) = jsonschema::validator_for(&schema) else {
        return Ok(());
    };

    let errors: Vec<String> = validator
        .iter_errors(&args_value)
        .map(|e| format!("  - {}: {e}", e.instance_path()))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(AgentError::Validation(format!(
            "argument validation failed for tool '{name}':\n{}",
            errors.join("\n")
        )))
    }
}

/// Parse raw JSON arguments into a typed struct.
pub fn parse_tool_args<T: DeserializeOwned>(name: ToolName, arguments: &str) -> Result<T> {
    serde_json::from_str(arguments)
        .map_err(|e| AgentError::Validation(format!("invalid arguments for tool '{name}': {e}")))
}

/// Log a tool call at INFO level with a truncated preview of arguments.
pub fn log_tool_call(name: &str, arguments: &str) {
    let args_preview: String = arguments.chars().take(120).collect();
    info!(
        "[tool] {}({args_preview}{})",
        name,
        if arguments.chars().count() > 120 { "..." } else { "" }
    );
    debug!("[tool] {name} full args ({} bytes)", arguments.len());
    trace!("[tool] {name} arguments: {arguments}");
}

/// Truncate a string to at most `max` bytes (on a char boundary), appending
/// a notice if trimmed.
pub fn truncate_result(s: String, max: usize) -> String {
    if s.len() <= max {
        return s;
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    let (head, _) = s.split_at(cut);
    format!("{head}...\n[truncated: {} bytes total]", s.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::command::{CommandFuture, CommandOutput};
    use std::path::Path;

    fn dispatcher(dir: &Path) -> ToolDispatcher {
        ToolDispatcher::new(dir, DispatcherConfig::default())
    }

    fn call(name: &str, args: serde_json::Value) -> ToolCall {
        ToolCall::new("call_1", name, args.to_string())
    }

    #[test]
    fn definitions_cover_every_tool_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let names: Vec<String> = dispatcher(dir.path())
            .definitions()
            .into_iter()
            .map(|d| d.function.name)
            .collect();
        assert_eq!(
            names,
            ["read_file", "write_file", "edit_file", "list_files", "run_command"]
        );
    }

    #[tokio::test]
    async fn write_then_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let tools = dispatcher(dir.path());
        let w = tools
            .dispatch(&call("write_file", serde_json::json!({"path": "hello.py", "content": "print('Hello')"})))
            .await;
        assert_eq!(w.status, ToolStatus::Ok);
        assert_eq!(w.touched.as_deref(), Some("hello.py"));

        let r = tools
            .dispatch(&call("read_file", serde_json::json!({"path": "hello.py"})))
            .await;
        assert_eq!(r.content, "print('Hello')");
        assert_eq!(r.to_message().tool_call_id.as_deref(), Some("call_1"));
    }

    #[tokio::test]
    async fn edit_failure_becomes_error_result() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "abc").unwrap();
        let result = dispatcher(dir.path())
            .dispatch(&call(
                "edit_file",
                serde_json::json!({"path": "a.txt", "find": "zzz", "replace": "y"}),
            ))
            .await;
        assert!(result.is_error());
        assert_eq!(result.model_text(), "Error: pattern not found in a.txt");
        assert!(result.touched.is_none());
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error_result() {
        let dir = tempfile::tempdir().unwrap();
        let result = dispatcher(dir.path())
            .dispatch(&call("delete_everything", serde_json::json!({})))
            .await;
        assert!(result.is_error());
        assert!(result.content.contains("unknown tool 'delete_everything'"));
    }

    #[tokio::test]
    async fn schema_validation_rejects_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let result = dispatcher(dir.path())
            .dispatch(&call("write_file", serde_json::json!({"path": "x.txt"})))
            .await;
        assert!(result.is_error());
        assert!(result.content.contains("argument validation failed"));
        assert!(!dir.path().join("x.txt").exists());
    }

    #[tokio::test]
    async fn malformed_json_is_a_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let tools = dispatcher(dir.path());
        let result = tools
            .dispatch(&ToolCall::new("c9", "read_file", "{not json"))
            .await;
        assert!(result.is_error());
        assert!(result.content.starts_with("invalid JSON arguments"));
    }

    #[tokio::test]
    async fn empty_arguments_are_treated_as_empty_object() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "").unwrap();
        let result = dispatcher(dir.path())
            .dispatch(&ToolCall::new("c1", "list_files", ""))
            .await;
        assert_eq!(result.status, ToolStatus::Ok);
        assert_eq!(result.content, "file f.txt");
    }

    #[tokio::test]
    async fn confinement_can_be_switched_off() {
        let outer = tempfile::tempdir().unwrap();
        let inner = outer.path().join("proj");
        std::fs::create_dir(&inner).unwrap();
        std::fs::write(outer.path().join("shared.txt"), "shared").unwrap();

        let confined = ToolDispatcher::new(&inner, DispatcherConfig::default());
        let read = call("read_file", serde_json::json!({"path": "../shared.txt"}));
        assert!(confined.dispatch(&read).await.is_error());

        let open = ToolDispatcher::new(&inner, DispatcherConfig::default().with_confinement(false));
        assert_eq!(open.dispatch(&read).await.content, "shared");
    }

    #[tokio::test]
    async fn large_results_are_truncated_with_original_length() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("big.txt"), "x".repeat(500)).unwrap();
        let tools = ToolDispatcher::new(
            dir.path(),
            DispatcherConfig::default().with_max_result_bytes(100),
        );
        let result = tools
            .dispatch(&call("read_file", serde_json::json!({"path": "big.txt"})))
            .await;
        assert_eq!(result.original_len, 500);
        assert!(result.content.ends_with("[truncated: 500 bytes total]"));
    }

    struct FixedRunner;

    impl CommandRunner for FixedRunner {
        fn run<'a>(&'a self, command: &'a str, _: &'a Path, _: Duration) -> CommandFuture<'a> {
            Box::pin(async move {
                Ok(CommandOutput {
                    exit_code: Some(0),
                    stdout: format!("ran {command}"),
                    stderr: String::new(),
                    duration: Duration::ZERO,
                })
            })
        }
    }

    #[tokio::test]
    async fn run_command_uses_configured_runner() {
        let dir = tempfile::tempdir().unwrap();
        let tools = dispatcher(dir.path()).with_runner(FixedRunner);
        let result = tools
            .dispatch(&call("run_command", serde_json::json!({"command": "make"})))
            .await;
        assert!(result.content.contains("ran make"));
    }

    #[test]
    fn truncate_result_respects_char_boundaries() {
        let s = "é".repeat(10);
        let t = truncate_result(s, 5);
        assert!(t.starts_with("éé..."));
    }
}
