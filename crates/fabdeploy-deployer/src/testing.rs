//! Fake Fabric CLI for tests.

use async_trait::async_trait;
use fabdeploy_core::{CommandOutput, CommandRunner};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

type Responder = Box<dyn Fn() -> CommandOutput + Send + Sync>;

/// Records every command and answers like a workspace where every `get`
/// succeeds with a predictable value:
/// - `get <path> -q id` returns `id:<last path segment>`
/// - the SQL endpoint query returns `sql:<last path segment>`
/// - `exists` is true only for paths registered with [`MockRunner::with_existing`]
///
/// On `import` the content of the imported directory is captured so tests
/// can inspect what would have been uploaded.
pub(crate) struct MockRunner {
    commands: Mutex<Vec<String>>,
    existing: HashSet<String>,
    failures: Vec<String>,
    timeouts: Vec<String>,
    responders: Vec<(String, Responder)>,
    snapshots: Mutex<BTreeMap<String, String>>,
    imported_dirs: Mutex<Vec<PathBuf>>,
}

impl MockRunner {
    pub(crate) fn new() -> Self {
        Self {
            commands: Mutex::new(Vec::new()),
            existing: HashSet::new(),
            failures: Vec::new(),
            timeouts: Vec::new(),
            responders: Vec::new(),
            snapshots: Mutex::new(BTreeMap::new()),
            imported_dirs: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_existing(mut self, path: &str) -> Self {
        self.existing.insert(path.to_string());
        self
    }

    /// Commands starting with `prefix` exit 1 with an error on stderr.
    pub(crate) fn fail_on(mut self, prefix: &str) -> Self {
        self.failures.push(prefix.to_string());
        self
    }

    /// Commands starting with `prefix` never finish within the timeout.
    pub(crate) fn time_out_on(mut self, prefix: &str) -> Self {
        self.timeouts.push(prefix.to_string());
        self
    }

    /// Commands starting with `prefix` get the output of `f`.
    pub(crate) fn respond_with(
        mut self,
        prefix: &str,
        f: impl Fn() -> CommandOutput + Send + Sync + 'static,
    ) -> Self {
        self.responders.push((prefix.to_string(), Box::new(f)));
        self
    }

    pub(crate) fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    /// Commands whose first word is `verb`.
    pub(crate) fn commands_for(&self, verb: &str) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|c| c.split_whitespace().next() == Some(verb))
            .collect()
    }

    /// File content at import time, keyed `<Name.Type>/<relative path>`.
    pub(crate) fn snapshot(&self, key: &str) -> Option<String> {
        self.snapshots.lock().unwrap().get(key).cloned()
    }

    pub(crate) fn snapshot_keys(&self) -> Vec<String> {
        self.snapshots.lock().unwrap().keys().cloned().collect()
    }

    pub(crate) fn imported_dirs(&self) -> Vec<PathBuf> {
        self.imported_dirs.lock().unwrap().clone()
    }

    fn respond(&self, command: &str) -> CommandOutput {
        if self.failures.iter().any(|p| command.starts_with(p)) {
            return CommandOutput::failed(1, format!("x {}: [Error] mock failure", command));
        }
        if let Some((_, f)) = self.responders.iter().find(|(p, _)| command.starts_with(p)) {
            return f();
        }

        let args: Vec<&str> = command.split_whitespace().collect();
        match args.as_slice() {
            ["exists", path, ..] => {
                let exists = self.existing.contains(*path);
                CommandOutput::ok(format!(
                    r#"{{"status": "Success", "command": "exists", "result": {{"message": "{}"}}}}"#,
                    exists
                ))
            }
            ["get", path, "-q", query, rest @ ..] => {
                let last = path.rsplit('/').next().unwrap_or(*path);
                let value = if *query == "id" {
                    format!("id:{}", last)
                } else if query.contains("sqlEndpoint") {
                    format!("sql:{}", last)
                } else {
                    format!("{}:{}", query, last)
                };
                if rest.contains(&"json") {
                    CommandOutput::ok(format!(
                        r#"{{"status": "Success", "command": "get", "result": {{"data": ["{}"]}}}}"#,
                        value
                    ))
                } else {
                    CommandOutput::ok(value)
                }
            }
            ["import", "-f", _, "-i", dir, ..] => {
                self.capture(Path::new(dir));
                CommandOutput::ok("* Imported")
            }
            ["api", ..] => CommandOutput::ok(r#"{"status_code": 200, "text": {}}"#),
            _ => CommandOutput::ok(""),
        }
    }

    fn capture(&self, dir: &Path) {
        self.imported_dirs.lock().unwrap().push(dir.to_path_buf());
        let item = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let mut snapshots = self.snapshots.lock().unwrap();
        for entry in walkdir::WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry.path().strip_prefix(dir).unwrap();
            let content = std::fs::read_to_string(entry.path()).unwrap_or_default();
            snapshots.insert(format!("{}/{}", item, rel.display()), content);
        }
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn run(&self, command: &str, timeout: Duration) -> fabdeploy_core::Result<CommandOutput> {
        self.commands.lock().unwrap().push(command.to_string());
        if self.timeouts.iter().any(|p| command.starts_with(p)) {
            return Err(fabdeploy_core::Error::Timeout {
                command: command.to_string(),
                seconds: timeout.as_secs(),
            });
        }
        Ok(self.respond(command))
    }
}

/// Write an item directory with the given files under `root`.
/// Non-lakehouse items get a `.platform` file unless one is provided.
pub(crate) fn write_item(root: &Path, qualified_name: &str, files: &[(&str, &str)]) -> PathBuf {
    let dir = root.join(qualified_name);
    std::fs::create_dir_all(&dir).unwrap();

    let (name, item_type) = qualified_name.rsplit_once('.').unwrap();
    let has_platform = files.iter().any(|(f, _)| *f == ".platform");
    if !has_platform && !item_type.eq_ignore_ascii_case("lakehouse") {
        let platform = serde_json::json!({
            "metadata": {"type": item_type, "displayName": name},
            "config": {"version": "2.0", "logicalId": "00000000-0000-0000-0000-000000000000"}
        });
        std::fs::write(dir.join(".platform"), platform.to_string()).unwrap();
    }

    for (file, content) in files {
        let path = dir.join(file);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }
    dir
}
