//! Subprocess execution with hard timeouts.
//!
//! Platform trust strategies and the external CA tool are pure logic plus
//! calls through [`CommandRunner`]. The system implementation kills the
//! child when the timeout elapses; tests substitute [`ScriptedRunner`].

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

use localtls_core::{Result, TlsError};

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if killed by a signal
    pub status: Option<i32>,
    /// Captured stdout (lossy UTF-8)
    pub stdout: String,
    /// Captured stderr (lossy UTF-8)
    pub stderr: String,
}

impl CommandOutput {
    /// Exit code 0.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.status, Some(0))
    }

    /// Successful output with the given stdout.
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stderr.
    #[must_use]
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Runs external programs.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, waiting at most `timeout`.
    ///
    /// Spawn failures and timeouts are [`TlsError::ToolInvocation`]; a
    /// non-zero exit is returned as output for the caller to interpret.
    async fn run(&self, program: &str, args: &[String], timeout: Duration)
        -> Result<CommandOutput>;

    /// Like [`run`](Self::run) but maps a non-zero exit to an error.
    async fn run_checked(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput> {
        let output = self.run(program, args, timeout).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(TlsError::tool(program, describe_failure(&output)))
        }
    }
}

/// Human-readable summary of a failed process.
#[must_use]
pub fn describe_failure(output: &CommandOutput) -> String {
    let detail = if output.stderr.trim().is_empty() {
        output.stdout.trim()
    } else {
        output.stderr.trim()
    };
    match output.status {
        Some(code) => format!("exit code {code}: {detail}"),
        None => format!("terminated by signal: {detail}"),
    }
}

/// Runs real processes via `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput> {
        debug!(program, ?args, timeout_secs = timeout.as_secs(), "running command");

        let child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => TlsError::tool(program, "not found on PATH"),
                _ => TlsError::tool(program, format!("failed to start: {e}")),
            })?;

        // Dropping the future on timeout drops the child, which kills it.
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                TlsError::tool(program, format!("timed out after {}s", timeout.as_secs()))
            })?
            .map_err(|e| TlsError::tool(program, format!("failed to collect output: {e}")))?;

        let result = CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(program, status = ?result.status, "command finished");
        Ok(result)
    }
}

/// Locate `binary` on `PATH` without running anything.
///
/// Paths containing a separator are checked directly.
#[must_use]
pub fn which(binary: &str) -> Option<PathBuf> {
    let candidate = PathBuf::from(binary);
    if candidate.components().count() > 1 {
        return is_executable(&candidate).then_some(candidate);
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path).find_map(|dir| {
        executable_names(binary)
            .into_iter()
            .map(|name| dir.join(name))
            .find(|p| is_executable(p))
    })
}

#[cfg(unix)]
fn is_executable(path: &std::path::Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &std::path::Path) -> bool {
    path.is_file()
}

fn executable_names(binary: &str) -> Vec<String> {
    if cfg!(windows) && std::path::Path::new(binary).extension().is_none() {
        vec![format!("{binary}.exe"), format!("{binary}.cmd"), binary.to_string()]
    } else {
        vec![binary.to_string()]
    }
}

/// One recorded call to a [`ScriptedRunner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program name
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
}

impl Invocation {
    /// Program and arguments joined by spaces.
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

type Responder = dyn Fn(&Invocation) -> Result<CommandOutput> + Send + Sync;

/// Runner that records calls and answers from a closure.
///
/// Used for dry runs and to exercise platform strategies without privileges.
pub struct ScriptedRunner {
    responder: Box<Responder>,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    /// Answer every call with `responder`.
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&Invocation) -> Result<CommandOutput> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every call succeeds with empty output.
    #[must_use]
    pub fn succeeding() -> Self {
        Self::new(|_| Ok(CommandOutput::ok("")))
    }

    /// Calls made so far.
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Command lines made so far.
    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(Invocation::command_line).collect()
    }
}

impl std::fmt::Debug for ScriptedRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedRunner")
            .field("calls", &self.calls())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        _timeout: Duration,
    ) -> Result<CommandOutput> {
        let invocation = Invocation {
            program: program.to_string(),
            args: args.to_vec(),
        };
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(invocation.clone());
        }
        (self.responder)(&invocation)
    }
}

/// Build an owned argument vector.
pub fn args<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_description_prefers_stderr() {
        let output = CommandOutput {
            status: Some(5),
            stdout: "ignored".into(),
            stderr: "access denied\n".into(),
        };
        assert_eq!(describe_failure(&output), "exit code 5: access denied");
    }

    #[tokio::test]
    async fn run_checked_maps_non_zero_exit() {
        let runner = ScriptedRunner::new(|_| Ok(CommandOutput::failed(1, "nope")));
        let err = runner
            .run_checked("certutil", &args(["-L"]), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.is_fallback_trigger());
        assert!(err.to_string().contains("nope"));
        assert_eq!(runner.command_lines(), vec!["certutil -L"]);
    }

    #[tokio::test]
    async fn missing_program_is_tool_error() {
        let err = SystemRunner
            .run(
                "localtls-definitely-not-installed",
                &[],
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TlsError::ToolInvocation { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_program_times_out() {
        let err = SystemRunner
            .run("sleep", &args(["5"]), Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"), "{err}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_exit_code_and_output() {
        let output = SystemRunner
            .run("sh", &args(["-c", "echo out; echo err >&2; exit 3"]), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(output.status, Some(3));
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[cfg(unix)]
    #[test]
    fn which_requires_the_executable_bit() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("mkcert");
        std::fs::write(&tool, b"#!/bin/sh\n").unwrap();
        let as_arg = tool.display().to_string();

        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o644)).unwrap();
        assert!(which(&as_arg).is_none());

        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(which(&as_arg), Some(tool));
    }

    #[test]
    fn which_finds_nothing_for_unknown_binary() {
        assert!(which("localtls-definitely-not-installed").is_none());
    }
}
