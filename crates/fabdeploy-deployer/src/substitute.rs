//! Apply the configured substitution rules to a staged item.

use fabdeploy_config::{DeployConfig, VariableBag, apply_all};
use fabdeploy_core::Item;
use std::path::PathBuf;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::{DeployError, DeployResult};

/// A file rewritten in place, with the match count of each rule.
#[derive(Debug, Clone)]
pub struct FileChange {
    pub path: PathBuf,
    pub counts: Vec<usize>,
}

impl FileChange {
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }
}

/// Rewrite every file of `item` that has rules for its type.
///
/// Files are matched by name anywhere under the item directory. A rule
/// that matches nothing is logged, or fails the item when `strict`.
pub fn apply_item_rules(
    item: &Item,
    config: &DeployConfig,
    bag: &VariableBag,
    strict: bool,
) -> DeployResult<Vec<FileChange>> {
    let Some(file_rules) = config.file_rules(&item.item_type) else {
        return Ok(Vec::new());
    };

    let mut changes = Vec::new();
    for entry in WalkDir::new(&item.path).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy();
        let Some(rules) = file_rules.get(file_name.as_ref()) else {
            continue;
        };
        if rules.is_empty() {
            continue;
        }

        let original = std::fs::read_to_string(entry.path())?;
        let (updated, counts) = apply_all(rules, &original, bag)?;

        for (rule, count) in rules.iter().zip(&counts) {
            if *count > 0 {
                continue;
            }
            if strict {
                return Err(DeployError::PatternNotMatched {
                    item: item.qualified_name(),
                    file: file_name.to_string(),
                    pattern: rule.pattern().to_string(),
                });
            }
            warn!(
                item = %item.qualified_name(),
                file = %file_name,
                pattern = %rule.pattern(),
                "Substitution pattern matched nothing"
            );
        }

        if updated != original {
            std::fs::write(entry.path(), &updated)?;
        }
        debug!(
            item = %item.qualified_name(),
            file = %file_name,
            replacements = counts.iter().sum::<usize>(),
            "Applied substitutions"
        );
        changes.push(FileChange {
            path: entry.path().to_path_buf(),
            counts,
        });
    }

    Ok(changes)
}
