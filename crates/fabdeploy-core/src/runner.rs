//! Command runner trait.
//!
//! The deployer never spawns processes itself; it talks to the Fabric CLI
//! through a [`CommandRunner`] so that tests can substitute a fake.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::Result;

/// Captured result of one CLI invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Process exit code, `None` if terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stderr.
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// The CLI reports some errors on stderr with a zero exit code, so both
    /// are checked. Any stderr output at all, whitespace included, fails.
    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0) && self.stderr.is_empty()
    }
}

/// Runs one Fabric CLI command line with a bounded wait.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Name of this runner.
    fn name(&self) -> &'static str;

    /// Run `command` (everything after `fab -c`) and capture its output.
    ///
    /// Returns `Err(Error::Timeout)` if the command has not finished
    /// within `timeout`. A nonzero exit is *not* an error at this level.
    async fn run(&self, command: &str, timeout: Duration) -> Result<CommandOutput>;
}
