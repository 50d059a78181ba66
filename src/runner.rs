//! Subprocess execution for the external `b2` and `op` CLI tools.
//!
//! The [`ToolRunner`] trait is the seam between orchestration and the outside
//! world: the real [`Subprocess`] implementation spawns the tool, tests
//! inject canned output through the generated mock. A failed launch or a
//! timeout is reported as a normal [`ToolOutput`] with status -1 and the
//! error text on stderr, so callers only deal in exit codes.

use std::process::Stdio;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use tokio::process::Command;
use tracing::{debug, error};

/// Captured result of one tool invocation.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Runs an external CLI tool to completion and captures its output.
///
/// Implemented by [`Subprocess`] for production and by `MockToolRunner`
/// (via `mockall`) in tests.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run<'a>(&self, program: &'a str, args: &'a [String]) -> Result<ToolOutput>;
}

/// Owned-`String` argv from string literals, for call sites building commands.
pub fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// Real subprocess runner with a per-invocation timeout.
#[derive(Debug, Clone)]
pub struct Subprocess {
    timeout: Duration,
}

impl Subprocess {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ToolRunner for Subprocess {
    async fn run<'a>(&self, program: &'a str, args: &'a [String]) -> Result<ToolOutput> {
        debug!(program = %program, args = ?args, "Running external command");
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output();
        match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(output)) => {
                let result = ToolOutput {
                    // None means the process died to a signal.
                    status: output.status.code().unwrap_or(-1),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                };
                debug!(program = %program, status = result.status, "External command finished");
                Ok(result)
            }
            Ok(Err(e)) => {
                error!(program = %program, error = %e, "Failed to launch external command");
                Ok(ToolOutput {
                    status: -1,
                    stdout: String::new(),
                    stderr: e.to_string(),
                })
            }
            Err(_) => {
                error!(program = %program, timeout_secs = self.timeout.as_secs(), "External command timed out");
                Ok(ToolOutput {
                    status: -1,
                    stdout: String::new(),
                    stderr: format!("command timed out after {} seconds", self.timeout.as_secs()),
                })
            }
        }
    }
}
