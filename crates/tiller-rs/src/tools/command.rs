//! Command-execution collaborator used by `run_command`.

use crate::{AgentError, Result};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::debug;

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, or `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl CommandOutput {
    /// Render for the model: exit code, then each non-empty stream, then
    /// the wall time.
    pub fn render(&self) -> String {
        let mut out = match self.exit_code {
            Some(code) => format!("exit code: {code}"),
            None => "exit code: terminated by signal".to_string(),
        };
        if !self.stdout.is_empty() {
            out.push_str("\n--- stdout ---\n");
            out.push_str(self.stdout.trim_end());
        }
        if !self.stderr.is_empty() {
            out.push_str("\n--- stderr ---\n");
            out.push_str(self.stderr.trim_end());
        }
        out.push_str(&format!("\n(took {:.2}s)", self.duration.as_secs_f64()));
        out
    }
}

/// Boxed future returned by [`CommandRunner::run`].
pub type CommandFuture<'a> = Pin<Box<dyn Future<Output = Result<CommandOutput>> + Send + 'a>>;

/// Runs a shell command string in a directory with a time limit.
///
/// Dropping the returned future must stop the command; the harness relies
/// on that for cancellation.
pub trait CommandRunner: Send + Sync {
    fn run<'a>(&'a self, command: &'a str, workdir: &'a Path, timeout: Duration)
    -> CommandFuture<'a>;
}

/// Runs commands through `sh -c`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
    fn run<'a>(
        &'a self,
        command: &'a str,
        workdir: &'a Path,
        timeout: Duration,
    ) -> CommandFuture<'a> {
        Box::pin(async move {
            let start = Instant::now();
            let child = Command::new("sh")
                .arg("-c")
                .arg(command)
                .current_dir(workdir)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| AgentError::io("failed to spawn command", e))?;

            let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
                Ok(result) => result.map_err(|e| AgentError::io("command failed", e))?,
                Err(_) => {
                    return Err(AgentError::Io(format!(
                        "command timed out after {}s",
                        timeout.as_secs()
                    )));
                }
            };

            let duration = start.elapsed();
            debug!(
                "Command exited with {:?} in {:.2}s",
                output.status.code(),
                duration.as_secs_f64()
            );
            Ok(CommandOutput {
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                duration,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_streams_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let out = ShellRunner
            .run("echo out; echo err >&2; exit 3", dir.path(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.exit_code, Some(3));
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");
    }

    #[tokio::test]
    async fn runs_in_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let out = ShellRunner
            .run("ls", dir.path(), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(out.stdout.contains("marker.txt"));
    }

    #[tokio::test]
    async fn times_out() {
        let dir = tempfile::tempdir().unwrap();
        let err = ShellRunner
            .run("sleep 5", dir.path(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err, AgentError::Io("command timed out after 1s".into()));
    }

    #[test]
    fn render_lists_sections() {
        let out = CommandOutput {
            exit_code: Some(0),
            stdout: "hello\n".into(),
            stderr: String::new(),
            duration: Duration::from_millis(250),
        };
        assert_eq!(out.render(), "exit code: 0\n--- stdout ---\nhello\n(took 0.25s)");
    }
}
