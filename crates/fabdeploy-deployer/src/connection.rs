//! Fabric connections and semantic model binding.

use fabdeploy_config::{ConnectionConfig, VariableBag};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::DeployResult;
use crate::fabric::{FabricClient, connection_path, what_if_marker};

const ADMIN_ROLE: &str = "admin";

/// Create `conn` if needed and return its id.
///
/// Creation may fail silently since the connection can already exist;
/// the id lookup that follows is what must succeed. Every non-blank
/// identity in `admin_upns` is granted the admin role.
pub async fn ensure_connection(
    fabric: &FabricClient,
    conn: &ConnectionConfig,
    bag: &VariableBag,
    admin_upns: &[String],
) -> DeployResult<String> {
    let params = conn.render_parameters(bag)?;
    let path = connection_path(&conn.name);

    fabric.create(&path, &params, true).await?;

    let id = if fabric.is_what_if() && !fabric.exists(&path).await? {
        what_if_marker(&format!("{}.Connection", conn.name))
    } else {
        fabric.get(&path, "id").await?
    };

    let upns: Vec<&str> = admin_upns
        .iter()
        .map(|u| u.trim())
        .filter(|u| !u.is_empty())
        .collect();
    if !upns.is_empty() {
        info!(connection = %conn.name, count = upns.len(), "Granting connection admins");
    }
    for upn in upns {
        fabric.acl_set(&path, upn, ADMIN_ROLE).await?;
    }

    info!(connection = %conn.name, id = %id, "Connection ready");
    Ok(id)
}

/// Result of a bind request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindOutcome {
    Bound,
    Skipped,
    /// The response did not look like a success; the run goes on.
    Unexpected(String),
}

/// Bind a semantic model to the SQL connection.
pub async fn bind_semantic_model(
    fabric: &FabricClient,
    workspace_id: &str,
    model_id: &str,
    connection_id: &str,
    sql_endpoint: &str,
    database: &str,
) -> DeployResult<BindOutcome> {
    let endpoint = format!(
        "workspaces/{}/semanticModels/{}/bindConnection",
        workspace_id, model_id
    );
    let body = json!({
        "connectionBinding": {
            "id": connection_id,
            "connectivityType": "ShareableCloud",
            "connectionDetails": {
                "type": "SQL",
                "path": format!("{};{}", sql_endpoint, database),
            }
        }
    });

    let Some(response) = fabric.api_post(&endpoint, &body).await? else {
        return Ok(BindOutcome::Skipped);
    };

    let outcome = match serde_json::from_str::<Value>(&response) {
        Ok(json) => match json.get("status_code").and_then(Value::as_u64) {
            Some(code) if (200..300).contains(&code) => BindOutcome::Bound,
            Some(code) => BindOutcome::Unexpected(format!("status code {}", code)),
            None => BindOutcome::Unexpected("no status_code in response".to_string()),
        },
        Err(e) => BindOutcome::Unexpected(format!("invalid JSON: {}", e)),
    };

    match &outcome {
        BindOutcome::Bound => info!(model = %model_id, "Bound semantic model"),
        BindOutcome::Unexpected(reason) => {
            warn!(model = %model_id, reason = %reason, "Semantic model binding not confirmed")
        }
        BindOutcome::Skipped => {}
    }
    Ok(outcome)
}
