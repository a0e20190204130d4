//! Fabric CLI runner.

use async_trait::async_trait;
use fabdeploy_core::runner::{CommandOutput, CommandRunner};
use fabdeploy_core::{Error, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Runs commands through `<fab_bin> -c <command>`.
pub struct FabCliRunner {
    /// Path to the fab binary
    fab_bin: String,
}

impl FabCliRunner {
    pub fn with_binary(fab_bin: impl Into<String>) -> Self {
        Self {
            fab_bin: fab_bin.into(),
        }
    }
}

#[async_trait]
impl CommandRunner for FabCliRunner {
    fn name(&self) -> &'static str {
        "fab"
    }

    async fn run(&self, command: &str, timeout: Duration) -> Result<CommandOutput> {
        debug!(bin = %self.fab_bin, command = %command, "Running fab command");

        let child = Command::new(&self.fab_bin)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| Error::Spawn {
                command: command.to_string(),
                source,
            })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| Error::Spawn {
                command: command.to_string(),
                source,
            })?,
            Err(_) => {
                warn!(command = %command, seconds = timeout.as_secs(), "fab command timed out");
                return Err(Error::Timeout {
                    command: command.to_string(),
                    seconds: timeout.as_secs(),
                });
            }
        };

        let output = CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };
        debug!(exit_code = ?output.exit_code, "fab command finished");
        Ok(output)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    // `sh -c <command>` stands in for `fab -c <command>`.
    fn shell() -> FabCliRunner {
        FabCliRunner::with_binary("sh")
    }

    #[tokio::test]
    async fn test_captures_stdout() {
        let output = shell()
            .run("echo 7f3c-lakehouse", Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(output.exit_code, Some(0));
        assert_eq!(output.stdout.trim(), "7f3c-lakehouse");
        assert!(output.is_success());
    }

    #[tokio::test]
    async fn test_captures_failure() {
        let output = shell()
            .run("echo not found >&2; exit 3", Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stderr.trim(), "not found");
        assert!(!output.is_success());
    }

    #[tokio::test]
    async fn test_timeout() {
        let start = std::time::Instant::now();
        let err = shell()
            .run("sleep 5", Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { ref command, .. } if command == "sleep 5"));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let runner = FabCliRunner::with_binary("/nonexistent/fab-binary");
        let err = runner
            .run("ls", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
    }
}
