//! Built-in deploy table.
//!
//! Use `$variable_name` for values filled in while deploying (see
//! [`crate::keys`]) and `\N` for regex groups.

use fabdeploy_core::ItemType;
use serde_json::json;

use crate::deploy::{ConnectionConfig, FileRules};
use crate::{ConfigResult, SubstitutionRule};

pub const CONNECTION_NAME: &str = "conn-cicd-demo";
pub const CONNECTION_SOURCE_URL: &str =
    "https://raw.githubusercontent.com/pbi-tools/sales-sample/refs/heads/data/RAW-Sales.csv";
pub const SQL_CONNECTION_NAME: &str = "conn-cicd-demo-sql";

fn rules(pairs: &[(&str, &str)]) -> ConfigResult<Vec<SubstitutionRule>> {
    pairs
        .iter()
        .map(|(pattern, replacement)| SubstitutionRule::new(pattern, replacement))
        .collect()
}

fn file(name: &str, rules: Vec<SubstitutionRule>) -> FileRules {
    FileRules::from([(name.to_string(), rules)])
}

/// Find-and-replace rules per item type and file name.
pub fn rule_table() -> ConfigResult<Vec<(ItemType, FileRules)>> {
    let pipeline = rules(&[
        (r#"("workspaceId"\s*:\s*)".*""#, r#"\1"$workspace_id""#),
        (r#"("artifactId"\s*:\s*)".*""#, r#"\1"$lakehouse_id""#),
        (r#"("connection"\s*:\s*)".*""#, r#"\1"$connection_id""#),
    ])?;

    let notebook = rules(&[
        (r#"("default_lakehouse"\s*:\s*)".*""#, r#"\1"$lakehouse_id""#),
        (
            r#"("default_lakehouse_name"\s*:\s*)".*""#,
            r#"\1"$lakehouse_name""#,
        ),
        (
            r#"("default_lakehouse_workspace_id"\s*:\s*)".*""#,
            r#"\1"$workspace_id""#,
        ),
        (
            r#"(#\s*META\s+"known_lakehouses"\s*:\s*)\[[\s\S]*?\]"#,
            concat!(
                r#"\1["#,
                "\n",
                r#"# META         {"#,
                "\n",
                r#"# META           "id": "$lakehouse_id""#,
                "\n",
                r#"# META         }"#,
                "\n",
                r#"# META       ]"#,
            ),
        ),
    ])?;

    let semantic_model = rules(&[(
        r#"(expression\s+Server\s*=\s*)".*?""#,
        r#"\1"$sql_endpoint""#,
    )])?;

    // The whole dataset reference is swapped for a live connection to the
    // deployed semantic model.
    let report_reference = json!({
        "version": "4.0",
        "datasetReference": {
            "byConnection": {
                "connectionString": null,
                "pbiServiceModelId": null,
                "pbiModelVirtualServerName": "sobe_wowvirtualserver",
                "pbiModelDatabaseName": "$semanticmodel_id",
                "name": "EntityDataSource",
                "connectionType": "pbiServiceXmlaStyleLive",
            }
        },
    })
    .to_string();
    let report = rules(&[(r"\{[\s\S]*\}", report_reference.as_str())])?;

    Ok(vec![
        (
            ItemType::data_pipeline(),
            file("pipeline-content.json", pipeline),
        ),
        (ItemType::notebook(), file("notebook-content.py", notebook)),
        (
            ItemType::semantic_model(),
            file("expressions.tmdl", semantic_model),
        ),
        (ItemType::report(), file("definition.pbir", report)),
    ])
}

/// Connection used by data pipelines to read the sample source.
pub fn connection() -> ConfigResult<ConnectionConfig> {
    ConnectionConfig::new(
        CONNECTION_NAME,
        &[
            ("connectionDetails.type", "HttpServer"),
            ("connectionDetails.parameters.url", CONNECTION_SOURCE_URL),
            ("credentialDetails.type", "Anonymous"),
        ],
    )
}

/// Connection to the lakehouse SQL endpoint that semantic models bind to.
pub fn sql_connection() -> ConfigResult<ConnectionConfig> {
    ConnectionConfig::new(
        SQL_CONNECTION_NAME,
        &[
            ("connectionDetails.type", "SQL"),
            ("connectionDetails.parameters.server", "$sql_endpoint"),
            ("connectionDetails.parameters.database", "$lakehouse_name"),
            ("credentialDetails.type", "WorkspaceIdentity"),
        ],
    )
}
