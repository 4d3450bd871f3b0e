//! Git process execution
//!
//! Every git invocation the engine makes goes through [`GitRunner`], so the
//! sync state machine can be driven against a scripted runner in tests.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// Captured result of one git invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitOutput {
    /// Exit code; `None` when the process did not run to completion
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl GitOutput {
    /// A successful run with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed run with the given exit code and stderr
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    fn not_run(reason: impl Into<String>) -> Self {
        Self {
            code: None,
            stdout: String::new(),
            stderr: reason.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Trimmed stderr, or stdout when stderr is empty
    pub fn diagnostic(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() { self.stdout.trim() } else { stderr }
    }
}

/// Runs git commands inside one repository
///
/// Implementations never fail: a process that cannot be spawned or that
/// times out is reported as an unsuccessful [`GitOutput`] carrying the reason.
#[async_trait]
pub trait GitRunner: Send + Sync {
    /// Run `git <args>` and wait for it to finish
    async fn run(&self, args: &[&str]) -> GitOutput;
}

/// Runs the real `git` binary with the repository root as working directory
pub struct GitCommand {
    workdir: PathBuf,
    timeout: Duration,
}

impl GitCommand {
    pub fn new(workdir: impl Into<PathBuf>, timeout: Duration) -> Self {
        let workdir = workdir.into();
        debug!(?workdir, ?timeout, "GitCommand::new: called");
        Self { workdir, timeout }
    }
}

#[async_trait]
impl GitRunner for GitCommand {
    async fn run(&self, args: &[&str]) -> GitOutput {
        debug!(?args, "GitCommand::run: called");
        let mut command = Command::new("git");
        command
            .args(args)
            .current_dir(&self.workdir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => {
                debug!(status = ?output.status, "GitCommand::run: completed");
                GitOutput {
                    code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                }
            }
            Ok(Err(e)) => {
                debug!(error = %e, "GitCommand::run: failed to spawn");
                GitOutput::not_run(format!("failed to run git: {}", e))
            }
            Err(_) => {
                debug!("GitCommand::run: timed out");
                GitOutput::not_run(format!(
                    "git {} timed out after {}s",
                    args.join(" "),
                    self.timeout.as_secs()
                ))
            }
        }
    }
}
