//! Typed Fabric CLI operations.

use fabdeploy_core::CommandRunner;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::{DeployError, DeployResult};

/// Default bound on a single CLI invocation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// `/<workspace>.Workspace`
pub fn workspace_path(workspace: &str) -> String {
    format!("/{}.Workspace", workspace)
}

/// `/<workspace>.Workspace/<name>.<Type>`
pub fn item_path(workspace: &str, qualified_name: &str) -> String {
    format!("/{}.Workspace/{}", workspace, qualified_name)
}

/// `.connections/<name>.Connection`
pub fn connection_path(name: &str) -> String {
    format!(".connections/{}.Connection", name)
}

/// Stand-in identifier for something a what-if run did not create.
pub fn what_if_marker(qualified_name: &str) -> String {
    format!("what-if:{}", qualified_name)
}

/// Fabric CLI wrapper. Every call is awaited to completion before the
/// next one is issued.
pub struct FabricClient {
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
    what_if: bool,
}

impl FabricClient {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            timeout: DEFAULT_TIMEOUT,
            what_if: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Log mutating commands instead of running them.
    pub fn with_what_if(mut self, what_if: bool) -> Self {
        self.what_if = what_if;
        self
    }

    pub fn is_what_if(&self) -> bool {
        self.what_if
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn runner_name(&self) -> &'static str {
        self.runner.name()
    }

    /// Run a command and return its trimmed stdout.
    ///
    /// Nonzero exit or anything on stderr fails the call unless
    /// `silently_continue` is set.
    pub async fn run(&self, command: &str, silently_continue: bool) -> DeployResult<String> {
        let output = self.runner.run(command, self.timeout).await?;

        if !silently_continue && !output.is_success() {
            return Err(fabdeploy_core::Error::CommandFailed {
                command: command.to_string(),
                exit_code: output.exit_code,
                stderr: output.stderr,
                stdout: output.stdout,
            }
            .into());
        }
        if !output.is_success() {
            debug!(command = %command, stderr = %output.stderr.trim(), "Ignoring fab failure");
        }

        Ok(output.stdout.trim().to_string())
    }

    /// Like [`run`](Self::run), but skipped in what-if mode.
    /// Returns `None` when skipped.
    async fn mutate(&self, command: &str, silently_continue: bool) -> DeployResult<Option<String>> {
        if self.what_if {
            info!(command = %command, "what-if: fab {}", command);
            return Ok(None);
        }
        self.run(command, silently_continue).await.map(Some)
    }

    /// `get <path> -q <query>` with plain text output.
    pub async fn get(&self, path: &str, query: &str) -> DeployResult<String> {
        self.run(&format!("get {} -q {}", path, query), false)
            .await
    }

    /// `get <path> -q <query> --output_format json`, returning the first
    /// entry of `result.data`.
    pub async fn get_json(&self, path: &str, query: &str) -> DeployResult<String> {
        let command = format!("get {} -q {} --output_format json", path, query);
        let stdout = self.run(&command, false).await?;
        let json = parse_json(&command, &stdout)?;

        match json.pointer("/result/data/0") {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Null) | None => Err(DeployError::UnexpectedOutput {
                command,
                message: "missing result.data[0]".to_string(),
            }),
            Some(other) => Ok(other.to_string()),
        }
    }

    /// `exists <path> --output_format json`.
    pub async fn exists(&self, path: &str) -> DeployResult<bool> {
        let command = format!("exists {} --output_format json", path);
        let stdout = self.run(&command, false).await?;
        let json = parse_json(&command, &stdout)?;

        match json.pointer("/result/message") {
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::String(s)) => Ok(s.trim().eq_ignore_ascii_case("true")),
            _ => Err(DeployError::UnexpectedOutput {
                command,
                message: "missing result.message".to_string(),
            }),
        }
    }

    /// `create <path> [-P k=v,...]`.
    pub async fn create(
        &self,
        path: &str,
        params: &[(String, String)],
        silently_continue: bool,
    ) -> DeployResult<()> {
        let mut command = format!("create {}", path);
        if !params.is_empty() {
            let joined = params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(",");
            command.push_str(&format!(" -P {}", joined));
        }
        self.mutate(&command, silently_continue).await?;
        Ok(())
    }

    /// `import -f <path> -i <dir> [--format <fmt>]`.
    pub async fn import(&self, path: &str, input: &Path, format: Option<&str>) -> DeployResult<()> {
        let mut command = format!("import -f {} -i {}", path, input.display());
        if let Some(format) = format {
            command.push_str(&format!(" --format {}", format));
        }
        self.mutate(&command, false).await?;
        Ok(())
    }

    /// `acl set -f <path> -I <identity> -R <role>`.
    pub async fn acl_set(&self, path: &str, identity: &str, role: &str) -> DeployResult<()> {
        let command = format!("acl set -f {} -I {} -R {}", path, identity, role);
        self.mutate(&command, false).await?;
        Ok(())
    }

    /// `job run <path>`, waits for the job within the command timeout.
    pub async fn run_job(&self, path: &str) -> DeployResult<()> {
        self.mutate(&format!("job run {}", path), false).await?;
        Ok(())
    }

    /// `api -X post <endpoint> -i <body>`. Returns the raw response, or
    /// `None` in what-if mode.
    pub async fn api_post(&self, endpoint: &str, body: &Value) -> DeployResult<Option<String>> {
        let command = format!("api -X post {} -i '{}'", endpoint, body);
        self.mutate(&command, false).await
    }
}

fn parse_json(command: &str, stdout: &str) -> DeployResult<Value> {
    serde_json::from_str(stdout).map_err(|e| DeployError::UnexpectedOutput {
        command: command.to_string(),
        message: format!("invalid JSON: {}", e),
    })
}
