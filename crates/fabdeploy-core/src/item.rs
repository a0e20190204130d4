//! Fabric item types and on-disk item definitions.
//!
//! An item is a directory named `<name>.<Type>`, e.g. `Sales.Lakehouse` or
//! `NB_TRNSF_Raw.Notebook`, holding the files of its definition.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

/// File inside every exported item that carries its metadata.
pub const PLATFORM_FILE: &str = ".platform";

/// The type of a Fabric item, taken from the directory suffix.
///
/// Comparison and hashing ignore ASCII case so `.lakehouse` and
/// `.Lakehouse` name the same type. The original spelling is kept for
/// display and for the paths sent to the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemType(String);

impl ItemType {
    pub const LAKEHOUSE: &'static str = "Lakehouse";
    pub const SEMANTIC_MODEL: &'static str = "SemanticModel";
    pub const REPORT: &'static str = "Report";
    pub const NOTEBOOK: &'static str = "Notebook";
    pub const DATA_PIPELINE: &'static str = "DataPipeline";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn lakehouse() -> Self {
        Self::new(Self::LAKEHOUSE)
    }

    pub fn semantic_model() -> Self {
        Self::new(Self::SEMANTIC_MODEL)
    }

    pub fn report() -> Self {
        Self::new(Self::REPORT)
    }

    pub fn notebook() -> Self {
        Self::new(Self::NOTEBOOK)
    }

    pub fn data_pipeline() -> Self {
        Self::new(Self::DATA_PIPELINE)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive check against a type name.
    pub fn is(&self, name: &str) -> bool {
        self.0.eq_ignore_ascii_case(name)
    }

    /// Lakehouses cannot be imported from a definition and are created instead.
    pub fn is_lakehouse(&self) -> bool {
        self.is(Self::LAKEHOUSE)
    }

    /// Extra `--format` argument the CLI needs when importing this type.
    pub fn import_format(&self) -> Option<&'static str> {
        if self.is(Self::NOTEBOOK) {
            Some(".py")
        } else {
            None
        }
    }

    /// The default dependency order: a lakehouse must exist before its id
    /// can populate notebook and pipeline definitions, a semantic model
    /// before the reports bound to it.
    pub fn default_order() -> Vec<ItemType> {
        vec![
            Self::lakehouse(),
            Self::semantic_model(),
            Self::report(),
            Self::notebook(),
            Self::data_pipeline(),
        ]
    }
}

impl PartialEq for ItemType {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for ItemType {}

impl Hash for ItemType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for b in self.0.bytes() {
            state.write_u8(b.to_ascii_lowercase());
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A deployable item directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Display name (path stem).
    pub name: String,
    /// Item type (path suffix).
    pub item_type: ItemType,
    /// Directory holding the item definition.
    pub path: PathBuf,
}

impl Item {
    /// Interpret a directory path as an item. Returns `None` when the
    /// directory name has no `.<Type>` suffix or an empty stem.
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let file_name = path.file_name()?.to_str()?;
        let (name, item_type) = file_name.rsplit_once('.')?;
        if name.is_empty() || item_type.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            item_type: ItemType::new(item_type),
            path,
        })
    }

    /// `<name>.<Type>` as used in workspace paths.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.name, self.item_type)
    }

    pub fn platform_path(&self) -> PathBuf {
        self.path.join(PLATFORM_FILE)
    }
}

/// Contents of an item's `.platform` file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformMetadata {
    pub metadata: PlatformItemMetadata,
    #[serde(default)]
    pub config: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformItemMetadata {
    #[serde(rename = "type")]
    pub item_type: ItemType,
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl PlatformMetadata {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
