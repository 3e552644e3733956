//! The five built-in tools.
//!
//! | Tool | Name | Purpose |
//! |------|------|---------|
//! | [`read_file`] | `read_file` | Read a whole file |
//! | [`write_file`] | `write_file` | Create or overwrite a file |
//! | [`edit_file`] | `edit_file` | Replace one exact, unique substring |
//! | [`list_files`] | `list_files` | List a directory tree |
//! | [`run_command`] | `run_command` | Run a shell command |
//!
//! Handlers return `Ok(text)` for the model or an [`AgentError`] that the
//! dispatcher turns into an error result.

use crate::tools::command::CommandRunner;
use crate::tools::workspace::Workspace;
use crate::{AgentError, Result};
use schemars::JsonSchema;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::fs;

/// Directory names never descended into by `list_files`.
pub const SKIPPED_DIRS: &[&str] = &[".git", "node_modules", "__pycache__", ".venv", "venv", "target"];

// ── Typed argument structs ──────────────────────────────────────────

/// Typed arguments for `read_file`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReadFileArgs {
    /// File path relative to the working directory (e.g. 'src/main.rs').
    pub path: String,
}

/// Typed arguments for `write_file`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct WriteFileArgs {
    /// File path relative to the working directory. Parent directories are created.
    pub path: String,
    /// Full content to write. Replaces any existing content.
    pub content: String,
}

/// Typed arguments for `edit_file`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct EditFileArgs {
    /// File path relative to the working directory.
    pub path: String,
    /// Exact text to find. Must occur exactly once in the file.
    #[serde(default)]
    pub find: Option<String>,
    /// Replacement text.
    #[serde(default)]
    pub replace: Option<String>,
    /// Alias for `find`.
    #[serde(default)]
    pub old_str: Option<String>,
    /// Alias for `replace`.
    #[serde(default)]
    pub new_str: Option<String>,
}

/// Typed arguments for `list_files`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListFilesArgs {
    /// Directory path relative to the working directory (default '.').
    #[serde(default)]
    pub path: Option<String>,
    /// How many levels to descend (default 1, immediate children only).
    #[serde(default)]
    pub depth: Option<u32>,
}

/// Typed arguments for `run_command`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct RunCommandArgs {
    /// Shell command to run in the working directory (e.g. 'cargo test', 'python hello.py').
    pub command: String,
}

// ── read_file ───────────────────────────────────────────────────────

pub async fn read_file(ws: &Workspace, args: ReadFileArgs) -> Result<String> {
    let full_path = ws.resolve(&args.path)?;

    // Catch directories early so the model gets an actionable hint instead
    // of the raw OS error.
    if let Ok(meta) = fs::metadata(&full_path).await
        && meta.is_dir()
    {
        return Err(AgentError::Validation(format!(
            "'{}' is a directory, not a file. Use list_files to browse directories.",
            args.path
        )));
    }

    fs::read_to_string(&full_path)
        .await
        .map_err(|e| AgentError::io(format!("reading '{}'", args.path), e))
}

// ── write_file ──────────────────────────────────────────────────────

pub async fn write_file(ws: &Workspace, args: WriteFileArgs) -> Result<String> {
    let full_path = ws.resolve(&args.path)?;
    if let Some(parent) = full_path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| AgentError::io(format!("creating parent of '{}'", args.path), e))?;
    }
    fs::write(&full_path, args.content.as_bytes())
        .await
        .map_err(|e| AgentError::io(format!("writing '{}'", args.path), e))?;
    Ok(format!(
        "wrote {} bytes to {}",
        args.content.len(),
        args.path
    ))
}

// ── edit_file ───────────────────────────────────────────────────────

pub async fn edit_file(ws: &Workspace, args: EditFileArgs) -> Result<String> {
    let find = args
        .find
        .or(args.old_str)
        .ok_or_else(|| AgentError::Validation("'find' argument is required".into()))?;
    let replace = args
        .replace
        .or(args.new_str)
        .ok_or_else(|| AgentError::Validation("'replace' argument is required".into()))?;
    if find.is_empty() {
        return Err(AgentError::Validation("'find' must not be empty".into()));
    }

    let full_path = ws.resolve(&args.path)?;
    let text = fs::read_to_string(&full_path)
        .await
        .map_err(|e| AgentError::io(format!("reading '{}'", args.path), e))?;

    let Some(first) = text.find(find.as_str()) else {
        return Err(AgentError::Validation(format!(
            "pattern not found in {}",
            args.path
        )));
    };
    if text.rfind(find.as_str()) != Some(first) {
        return Err(AgentError::Validation(format!(
            "pattern is ambiguous: found {} occurrences in {}",
            count_overlapping(&text, &find),
            args.path
        )));
    }

    let updated = text.replacen(find.as_str(), &replace, 1);
    fs::write(&full_path, updated.as_bytes())
        .await
        .map_err(|e| AgentError::io(format!("writing '{}'", args.path), e))?;
    Ok(format!("edited {}", args.path))
}

/// Occurrences of `pattern` in `text`, overlapping ones included.
fn count_overlapping(text: &str, pattern: &str) -> usize {
    text.char_indices()
        .filter(|&(i, _)| text.get(i..).is_some_and(|rest| rest.starts_with(pattern)))
        .count()
}

// ── list_files ──────────────────────────────────────────────────────

pub async fn list_files(ws: &Workspace, args: ListFilesArgs) -> Result<String> {
    let path = args.path.unwrap_or_else(|| ".".into());
    let depth = args.depth.unwrap_or(1).max(1);
    let full_path = ws.resolve(&path)?;

    let meta = fs::metadata(&full_path)
        .await
        .map_err(|e| AgentError::io(format!("listing '{path}'"), e))?;
    if !meta.is_dir() {
        return Err(AgentError::Validation(format!("not a directory: {path}")));
    }

    let lines = tokio::task::spawn_blocking(move || {
        let mut lines = Vec::new();
        walk(&full_path, "", depth, &mut lines).map(|_| lines)
    })
    .await
    .map_err(|e| AgentError::Io(format!("listing task failed: {e}")))?
    .map_err(|e| AgentError::io(format!("listing '{path}'"), e))?;

    if lines.is_empty() {
        Ok("(empty directory)".into())
    } else {
        Ok(lines.join("\n"))
    }
}

fn walk(dir: &Path, indent: &str, depth: u32, lines: &mut Vec<String>) -> std::io::Result<()> {
    let mut entries: Vec<(String, bool)> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| {
            let is_dir = e.file_type().is_ok_and(|t| t.is_dir());
            (e.file_name().to_string_lossy().into_owned(), is_dir)
        })
        .filter(|(name, _)| !SKIPPED_DIRS.contains(&name.as_str()))
        .collect();
    entries.sort();

    for (name, is_dir) in entries {
        if is_dir {
            let at = lines.len();
            lines.push(format!("{indent}dir  {name}/"));
            if depth > 1
                && walk(&dir.join(&name), &format!("{indent}  "), depth - 1, lines).is_err()
            {
                lines[at].push_str(" (unreadable)");
            }
        } else {
            lines.push(format!("{indent}file {name}"));
        }
    }
    Ok(())
}

// ── run_command ─────────────────────────────────────────────────────

pub async fn run_command(
    ws: &Workspace,
    runner: &dyn CommandRunner,
    timeout: Duration,
    args: RunCommandArgs,
) -> Result<String> {
    if args.command.trim().is_empty() {
        return Err(AgentError::Validation("'command' must not be empty".into()));
    }
    let output = runner.run(&args.command, ws.root(), timeout).await?;
    Ok(output.render())
}

// ── Tests ───────────────────────────────────────────────────────────
