//! External command execution
//!
//! Every call into the vault CLI goes through [`CommandRunner`], so the
//! broker can be exercised against a scripted runner in tests.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tracing::{debug, warn};

/// Captured result of an external command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if the process was killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stderr
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs external programs
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion with stdin closed, capturing stdout and stderr.
    ///
    /// Dropping the returned future kills the child.
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput>;

    /// Run attached to the terminal: stdin and stderr are inherited, stdout is
    /// captured. No timeout applies; the user may take as long as they need.
    async fn run_interactive(&self, program: &str, args: &[String]) -> Result<CommandOutput>;

    /// Whether `program` can be found
    fn is_available(&self, program: &str) -> bool;
}

/// [`CommandRunner`] backed by `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        debug!("Running: {} {}", program, args.join(" "));

        let output = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::command_spawn(program, e))?;

        let result = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !result.success() {
            debug!(
                "Command exited with {:?}: {} {}",
                result.code,
                program,
                args.join(" ")
            );
        }

        Ok(result)
    }

    async fn run_interactive(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        debug!("Running interactively: {} {}", program, args.join(" "));

        let output = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::inherit())
            .stderr(Stdio::inherit())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::command_spawn(program, e))?;

        let result = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::new(),
        };

        if !result.success() {
            warn!("Interactive command failed: {} (exit {:?})", program, result.code);
        }

        Ok(result)
    }

    fn is_available(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_output_helpers() {
        assert!(CommandOutput::ok("x").success());
        let failed = CommandOutput::failed(1, "boom");
        assert!(!failed.success());
        assert_eq!(failed.stderr, "boom");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_captures_stdout() {
        let runner = SystemRunner::new();
        let out = runner
            .run("sh", &["-c".to_string(), "printf hello".to_string()])
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_reports_exit_code() {
        let runner = SystemRunner::new();
        let out = runner
            .run("sh", &["-c".to_string(), "echo nope >&2; exit 3".to_string()])
            .await
            .unwrap();
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stderr.trim(), "nope");
    }

    #[tokio::test]
    async fn test_system_runner_missing_program() {
        let runner = SystemRunner::new();
        let err = runner
            .run("brokkr-definitely-not-installed", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CommandNotFound { .. }));
        assert!(!runner.is_available("brokkr-definitely-not-installed"));
    }
}
