//! Deploy table: item order, substitution rules and connections.
//!
//! The built-in table comes from [`crate::defaults`]. A KDL file can
//! replace parts of it:
//!
//! ```kdl
//! deploy-order "Lakehouse" "SemanticModel" "Report" "Notebook" "DataPipeline"
//!
//! item "DataPipeline" {
//!     file "pipeline-content.json" {
//!         replace pattern=##"("workspaceId"\s*:\s*)".*""## replacement=##"\1"$workspace_id""##
//!     }
//! }
//!
//! connection "conn-cicd-demo" {
//!     param "connectionDetails.type" "HttpServer"
//! }
//!
//! sql-connection disabled=#true
//!
//! ignore-extension "abf"
//! ```

use fabdeploy_core::ItemType;
use kdl::{KdlDocument, KdlNode};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use crate::variables::{Template, VariableBag};
use crate::{ConfigError, ConfigResult, SubstitutionRule, defaults};

/// Rules for one item type, keyed by file name within the item.
pub type FileRules = BTreeMap<String, Vec<SubstitutionRule>>;

/// A Fabric connection created before or after the item pass.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub name: String,
    /// `-P` parameters in order; values may reference variables.
    pub parameters: Vec<(String, Template)>,
}

impl ConnectionConfig {
    pub fn new(name: impl Into<String>, parameters: &[(&str, &str)]) -> ConfigResult<Self> {
        let parameters = parameters
            .iter()
            .map(|(k, v)| -> ConfigResult<(String, Template)> {
                Ok((k.to_string(), Template::parse_plain(v)?))
            })
            .collect::<ConfigResult<Vec<_>>>()?;
        Ok(Self {
            name: name.into(),
            parameters,
        })
    }

    /// Resolve parameter values against `bag`.
    pub fn render_parameters(&self, bag: &VariableBag) -> ConfigResult<Vec<(String, String)>> {
        self.parameters
            .iter()
            .map(|(k, v)| -> ConfigResult<(String, String)> {
                Ok((k.clone(), v.render_plain(bag)?))
            })
            .collect()
    }
}

/// Everything the sequencer needs to know besides the item tree.
#[derive(Debug, Clone)]
pub struct DeployConfig {
    /// Item types in the order they are deployed.
    pub deploy_order: Vec<ItemType>,
    /// Data-source connection created before any item.
    pub connection: Option<ConnectionConfig>,
    /// SQL endpoint connection created after items, for semantic model binding.
    pub sql_connection: Option<ConnectionConfig>,
    /// File extensions (without the dot) left out of the staging copy.
    pub ignore_extensions: Vec<String>,
    rules: HashMap<ItemType, FileRules>,
}

impl DeployConfig {
    /// An empty table with the given order.
    pub fn new(deploy_order: Vec<ItemType>) -> Self {
        Self {
            deploy_order,
            connection: None,
            sql_connection: None,
            ignore_extensions: Vec::new(),
            rules: HashMap::new(),
        }
    }

    /// The built-in table.
    pub fn builtin() -> ConfigResult<Self> {
        let mut config = Self::new(ItemType::default_order());
        for (item_type, files) in defaults::rule_table()? {
            config.rules.insert(item_type, files);
        }
        config.connection = Some(defaults::connection()?);
        config.sql_connection = Some(defaults::sql_connection()?);
        config.ignore_extensions = vec!["abf".to_string()];
        Ok(config)
    }

    /// The built-in table, overridden by the KDL file at `path` if given.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = Self::builtin()?;
        if let Some(path) = path {
            let content = std::fs::read_to_string(path)?;
            config.extend_from_kdl(&content)?;
        }
        Ok(config)
    }

    /// Replace the rules for one file of one item type.
    pub fn set_rules(
        &mut self,
        item_type: ItemType,
        file_name: impl Into<String>,
        rules: Vec<SubstitutionRule>,
    ) {
        self.rules
            .entry(item_type)
            .or_default()
            .insert(file_name.into(), rules);
    }

    /// All file rules for an item type.
    pub fn file_rules(&self, item_type: &ItemType) -> Option<&FileRules> {
        self.rules.get(item_type)
    }

    /// Rules for a single file, empty if none are registered.
    pub fn rules_for(&self, item_type: &ItemType, file_name: &str) -> &[SubstitutionRule] {
        self.rules
            .get(item_type)
            .and_then(|files| files.get(file_name))
            .map(|r| r.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_ignored(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                self.ignore_extensions
                    .iter()
                    .any(|i| i.eq_ignore_ascii_case(ext))
            })
    }

    /// Apply overrides from KDL text.
    pub fn extend_from_kdl(&mut self, kdl: &str) -> ConfigResult<()> {
        let doc: KdlDocument = kdl.parse()?;

        for node in doc.nodes() {
            match node.name().value() {
                "deploy-order" => {
                    self.deploy_order = parse_deploy_order(node)?;
                }
                "item" => {
                    let (item_type, files) = parse_item(node)?;
                    for (file_name, rules) in files {
                        self.set_rules(item_type.clone(), file_name, rules);
                    }
                }
                "connection" => {
                    self.connection = parse_connection(node)?;
                }
                "sql-connection" => {
                    self.sql_connection = parse_connection(node)?;
                }
                "ignore-extension" => {
                    self.ignore_extensions = get_all_string_args(node)
                        .into_iter()
                        .map(|e| e.trim_start_matches('.').to_string())
                        .collect();
                }
                _ => {} // Ignore unknown nodes
            }
        }

        Ok(())
    }
}

fn parse_deploy_order(node: &KdlNode) -> ConfigResult<Vec<ItemType>> {
    let types = get_all_string_args(node);
    if types.is_empty() {
        return Err(ConfigError::MissingField("deploy-order item types".to_string()));
    }

    let mut seen = HashSet::new();
    let mut order = Vec::with_capacity(types.len());
    for name in types {
        let item_type = ItemType::new(name);
        if !seen.insert(item_type.clone()) {
            return Err(ConfigError::Duplicate(format!(
                "item type '{}' in deploy-order",
                item_type
            )));
        }
        order.push(item_type);
    }
    Ok(order)
}

fn parse_item(node: &KdlNode) -> ConfigResult<(ItemType, FileRules)> {
    let item_type = get_first_string_arg(node)
        .map(ItemType::new)
        .ok_or_else(|| ConfigError::MissingField("item type".to_string()))?;

    let mut files = FileRules::new();
    if let Some(children) = node.children() {
        for child in children.nodes() {
            if child.name().value() != "file" {
                continue;
            }
            let file_name = get_first_string_arg(child).ok_or_else(|| {
                ConfigError::MissingField(format!("file name for item '{}'", item_type))
            })?;
            if files.contains_key(&file_name) {
                return Err(ConfigError::Duplicate(format!(
                    "file '{}' for item '{}'",
                    file_name, item_type
                )));
            }
            let rules = parse_file_rules(child, &item_type, &file_name)?;
            files.insert(file_name, rules);
        }
    }

    Ok((item_type, files))
}

fn parse_file_rules(
    node: &KdlNode,
    item_type: &ItemType,
    file_name: &str,
) -> ConfigResult<Vec<SubstitutionRule>> {
    let mut rules = Vec::new();
    if let Some(children) = node.children() {
        for child in children.nodes() {
            if child.name().value() != "replace" {
                continue;
            }
            let pattern = get_string_prop(child, "pattern").ok_or_else(|| {
                ConfigError::MissingField(format!("pattern for {}/{}", item_type, file_name))
            })?;
            let replacement = get_string_prop(child, "replacement").ok_or_else(|| {
                ConfigError::MissingField(format!("replacement for {}/{}", item_type, file_name))
            })?;
            rules.push(SubstitutionRule::new(&pattern, &replacement)?);
        }
    }
    Ok(rules)
}

fn parse_connection(node: &KdlNode) -> ConfigResult<Option<ConnectionConfig>> {
    if get_bool_prop(node, "disabled").unwrap_or(false) {
        return Ok(None);
    }

    let name = get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("connection name".to_string()))?;

    let mut parameters = Vec::new();
    if let Some(children) = node.children() {
        for child in children.nodes() {
            if child.name().value() != "param" {
                continue;
            }
            match get_all_string_args(child).as_slice() {
                [key, value] => parameters.push((key.clone(), Template::parse_plain(value)?)),
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: format!("param of connection '{}'", name),
                        message: "expected a key and a value".to_string(),
                    });
                }
            }
        }
    }

    Ok(Some(ConnectionConfig { name, parameters }))
}

// Helper functions for extracting values from KDL nodes

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_all_string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

fn get_bool_prop(node: &KdlNode, name: &str) -> Option<bool> {
    node.get(name).and_then(|v| v.as_bool())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys;
    use std::io::Write;

    #[test]
    fn test_builtin_table() {
        let config = DeployConfig::builtin().unwrap();
        assert_eq!(config.deploy_order, ItemType::default_order());
        assert_eq!(
            config
                .rules_for(&ItemType::data_pipeline(), "pipeline-content.json")
                .len(),
            3
        );
        assert_eq!(
            config
                .rules_for(&ItemType::notebook(), "notebook-content.py")
                .len(),
            4
        );
        assert!(config.file_rules(&ItemType::lakehouse()).is_none());
        assert!(
            config
                .rules_for(&ItemType::report(), "report.json")
                .is_empty()
        );
        assert!(config.is_ignored(Path::new("Sales.SemanticModel/model.abf")));
        assert!(!config.is_ignored(Path::new("Sales.SemanticModel/model.bim")));
    }

    #[test]
    fn test_rules_lookup_ignores_type_case() {
        let config = DeployConfig::builtin().unwrap();
        assert_eq!(
            config
                .rules_for(&ItemType::new("datapipeline"), "pipeline-content.json")
                .len(),
            3
        );
    }

    #[test]
    fn test_parse_deploy_order() {
        let mut config = DeployConfig::builtin().unwrap();
        config
            .extend_from_kdl(r#"deploy-order "Lakehouse" "Notebook""#)
            .unwrap();
        assert_eq!(
            config.deploy_order,
            vec![ItemType::lakehouse(), ItemType::notebook()]
        );
    }

    #[test]
    fn test_duplicate_deploy_order() {
        let mut config = DeployConfig::builtin().unwrap();
        let result = config.extend_from_kdl(r#"deploy-order "Lakehouse" "lakehouse""#);
        assert!(matches!(result.unwrap_err(), ConfigError::Duplicate(_)));
    }

    #[test]
    fn test_item_rules_replace_builtin() {
        let kdl = r###"
            item "DataPipeline" {
                file "pipeline-content.json" {
                    replace pattern=##"("workspaceId"\s*:\s*)".*""## replacement=##"\1"$workspace_id""##
                }
            }

            item "Eventhouse" {
                file "EventhouseProperties.json" {
                    replace pattern="OLD" replacement="$workspace_id"
                }
            }
        "###;

        let mut config = DeployConfig::builtin().unwrap();
        config.extend_from_kdl(kdl).unwrap();

        let rules = config.rules_for(&ItemType::data_pipeline(), "pipeline-content.json");
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].pattern(), r#"("workspaceId"\s*:\s*)".*""#);
        assert_eq!(rules[0].template().as_str(), r#"\1"$workspace_id""#);

        let custom = config.rules_for(&ItemType::new("Eventhouse"), "EventhouseProperties.json");
        assert_eq!(custom.len(), 1);

        // Other builtin entries are untouched
        assert_eq!(
            config
                .rules_for(&ItemType::notebook(), "notebook-content.py")
                .len(),
            4
        );
    }

    #[test]
    fn test_invalid_rule_pattern() {
        let kdl = r#"
            item "Notebook" {
                file "notebook-content.py" {
                    replace pattern="(unclosed" replacement="x"
                }
            }
        "#;
        let mut config = DeployConfig::builtin().unwrap();
        assert!(matches!(
            config.extend_from_kdl(kdl).unwrap_err(),
            ConfigError::InvalidPattern { .. }
        ));
    }

    #[test]
    fn test_missing_replacement() {
        let kdl = r#"
            item "Notebook" {
                file "notebook-content.py" {
                    replace pattern="x"
                }
            }
        "#;
        let mut config = DeployConfig::builtin().unwrap();
        assert!(matches!(
            config.extend_from_kdl(kdl).unwrap_err(),
            ConfigError::MissingField(_)
        ));
    }

    #[test]
    fn test_parse_connections() {
        let kdl = r#"
            connection "conn-source" {
                param "connectionDetails.type" "HttpServer"
                param "connectionDetails.parameters.url" "https://example.com/data.csv"
            }

            sql-connection disabled=#true
        "#;
        let mut config = DeployConfig::builtin().unwrap();
        config.extend_from_kdl(kdl).unwrap();

        let connection = config.connection.unwrap();
        assert_eq!(connection.name, "conn-source");
        let params = connection.render_parameters(&VariableBag::new()).unwrap();
        assert_eq!(
            params,
            vec![
                (
                    "connectionDetails.type".to_string(),
                    "HttpServer".to_string()
                ),
                (
                    "connectionDetails.parameters.url".to_string(),
                    "https://example.com/data.csv".to_string()
                ),
            ]
        );
        assert!(config.sql_connection.is_none());
    }

    #[test]
    fn test_connection_param_arity() {
        let kdl = r#"
            connection "conn-source" {
                param "connectionDetails.type"
            }
        "#;
        let mut config = DeployConfig::builtin().unwrap();
        assert!(matches!(
            config.extend_from_kdl(kdl).unwrap_err(),
            ConfigError::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_sql_connection_renders_from_bag() {
        let config = DeployConfig::builtin().unwrap();
        let sql = config.sql_connection.unwrap();

        let bag = VariableBag::new().with(keys::SQL_ENDPOINT, "x.datawarehouse.fabric.microsoft.com");
        let err = sql.render_parameters(&bag).unwrap_err();
        assert!(matches!(err, ConfigError::MissingPlaceholder(k) if k == keys::LAKEHOUSE_NAME));

        let bag = bag.with(keys::LAKEHOUSE_NAME, "LH_STORE_RAW");
        let params = sql.render_parameters(&bag).unwrap();
        assert!(params.contains(&(
            "connectionDetails.parameters.server".to_string(),
            "x.datawarehouse.fabric.microsoft.com".to_string()
        )));
    }

    #[test]
    fn test_ignore_extensions() {
        let mut config = DeployConfig::builtin().unwrap();
        config
            .extend_from_kdl(r#"ignore-extension ".abf" "bak""#)
            .unwrap();
        assert!(config.is_ignored(Path::new("a/b.ABF")));
        assert!(config.is_ignored(Path::new("a/b.bak")));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"deploy-order "Lakehouse" "Report""#).unwrap();

        let config = DeployConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.deploy_order.len(), 2);

        let config = DeployConfig::load(None).unwrap();
        assert_eq!(config.deploy_order.len(), 5);
    }

    #[test]
    fn test_kdl_syntax_error() {
        let mut config = DeployConfig::builtin().unwrap();
        assert!(matches!(
            config.extend_from_kdl("item {").unwrap_err(),
            ConfigError::Parse(_)
        ));
    }
}
