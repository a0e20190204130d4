//! Scratch copy of the item tree.
//!
//! Substitutions are applied to a copy so the source tree is never
//! modified. The copy lives in a temporary directory that is removed when
//! the [`StagingArea`] is dropped, whether the run succeeded or not.

use fabdeploy_config::DeployConfig;
use fabdeploy_core::Item;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::{DeployError, DeployResult};

pub struct StagingArea {
    // Held only so the directory is removed on drop.
    _dir: TempDir,
    items_dir: PathBuf,
}

impl StagingArea {
    /// Copy `source` into a new temporary directory, leaving out files
    /// whose extension `config` ignores.
    pub fn create(workspace: &str, source: &Path, config: &DeployConfig) -> DeployResult<Self> {
        if !source.is_dir() {
            return Err(DeployError::SourceNotFound(source.to_path_buf()));
        }

        let dir = tempfile::Builder::new()
            .prefix(&format!("{}_", workspace))
            .suffix("_deployment")
            .tempdir()?;
        let items_dir = dir.path().join("items");

        let copied = copy_tree(source, &items_dir, config)?;
        info!(
            source = %source.display(),
            staging = %items_dir.display(),
            files = copied,
            "Staged item definitions"
        );

        Ok(Self {
            _dir: dir,
            items_dir,
        })
    }

    pub fn items_dir(&self) -> &Path {
        &self.items_dir
    }

    pub fn discover_items(&self) -> DeployResult<Vec<Item>> {
        discover_items(&self.items_dir)
    }
}

fn copy_tree(source: &Path, dest: &Path, config: &DeployConfig) -> DeployResult<usize> {
    let mut copied = 0;
    std::fs::create_dir_all(dest)?;

    // Symlinked directories are copied as their contents.
    for entry in WalkDir::new(source).min_depth(1).follow_links(true) {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        let target = dest.join(rel);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if config.is_ignored(entry.path()) {
            debug!(file = %rel.display(), "Skipping ignored file");
        } else {
            std::fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }

    Ok(copied)
}

/// Item directories directly under `dir`, sorted by name.
pub fn discover_items(dir: &Path) -> DeployResult<Vec<Item>> {
    if !dir.is_dir() {
        return Err(DeployError::SourceNotFound(dir.to_path_buf()));
    }

    let mut items = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        match Item::from_path(entry.path()) {
            Some(item) => items.push(item),
            None => debug!(path = %entry.path().display(), "Not an item directory"),
        }
    }
    items.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.path.cmp(&b.path)));
    Ok(items)
}
