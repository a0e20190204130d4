//! Error types for fabdeploy CLI invocations.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(
        "error running fab command: {command}\nexit_code: '{}'; stderr: '{stderr}'; stdout: '{stdout}'",
        fmt_exit_code(.exit_code)
    )]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
        stdout: String,
    },

    #[error("command timed out after {seconds} seconds: {command}")]
    Timeout { command: String, seconds: u64 },

    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

fn fmt_exit_code(code: &Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "none".to_string())
}
