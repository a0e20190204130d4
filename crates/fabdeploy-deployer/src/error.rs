//! Deployment errors.

use fabdeploy_config::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Cli(#[from] fabdeploy_core::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("source directory not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("invalid item {}: {message}", .path.display())]
    InvalidItem { path: PathBuf, message: String },

    #[error("unexpected output from `{command}`: {message}")]
    UnexpectedOutput { command: String, message: String },

    #[error("pattern {pattern:?} matched nothing in {item}/{file}")]
    PatternNotMatched {
        item: String,
        file: String,
        pattern: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
}

pub type DeployResult<T> = std::result::Result<T, DeployError>;
