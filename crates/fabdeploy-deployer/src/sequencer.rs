//! Deployment sequencer - deploys items type by type in the configured order.
//!
//! Each deployed item may add values to the [`VariableBag`] that later
//! items reference in their substitution templates, so the order of the
//! pass matters: a lakehouse id must exist before a notebook can point at
//! it, a semantic model id before a report binds to it.

use chrono::{DateTime, Utc};
use fabdeploy_config::{DeployConfig, VariableBag, keys};
use fabdeploy_core::{Item, ItemType, PlatformMetadata, RunId};
use serde::Serialize;
use std::path::Path;
use tracing::{error, info, warn};

use crate::connection::{BindOutcome, bind_semantic_model, ensure_connection};
use crate::fabric::{FabricClient, item_path, what_if_marker, workspace_path};
use crate::staging::StagingArea;
use crate::substitute::apply_item_rules;
use crate::{DeployError, DeployResult};

const SQL_ENDPOINT_QUERY: &str = "properties.sqlEndpointProperties.connectionString";

/// Behaviour switches for a deployment run.
#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    /// Log mutating commands instead of running them.
    pub what_if: bool,
    /// Fail when a substitution pattern matches nothing.
    pub strict_patterns: bool,
    /// Create the SQL connection and bind deployed semantic models to it.
    pub bind_semantic_models: bool,
    /// Run every deployed data pipeline once.
    pub run_pipelines: bool,
    /// Identities granted admin on created connections.
    pub admin_upns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployedItem {
    pub name: String,
    pub item_type: ItemType,
    pub id: String,
}

impl DeployedItem {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.name, self.item_type)
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentReport {
    pub run_id: RunId,
    pub workspace_name: String,
    pub workspace_id: String,
    pub what_if: bool,
    pub items: Vec<DeployedItem>,
    /// Item directories whose type is not in the deploy order.
    pub skipped: Vec<String>,
    pub bound_models: Vec<String>,
    pub pipelines_run: Vec<String>,
    pub variables: VariableBag,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Items in deploy order, plus the ones no step handles.
#[derive(Debug, Clone, Default)]
pub struct DeployPlan {
    pub ordered: Vec<Item>,
    pub skipped: Vec<Item>,
}

/// Order `items` by `order`. Within a type the incoming order is kept.
pub fn plan_items(order: &[ItemType], items: Vec<Item>) -> DeployPlan {
    let mut plan = DeployPlan::default();
    for item_type in order {
        plan.ordered
            .extend(items.iter().filter(|i| &i.item_type == item_type).cloned());
    }
    plan.skipped = items
        .into_iter()
        .filter(|i| !order.contains(&i.item_type))
        .collect();
    plan
}

/// Strip a trailing `.workspace` in any case.
pub fn normalize_workspace_name(name: &str) -> &str {
    const SUFFIX: &str = ".workspace";
    name.len()
        .checked_sub(SUFFIX.len())
        .filter(|&at| at > 0)
        .and_then(|at| {
            name.get(at..)
                .filter(|tail| tail.eq_ignore_ascii_case(SUFFIX))
                .map(|_| &name[..at])
        })
        .unwrap_or(name)
}

/// Non-lakehouse items must carry a `.platform` file whose type matches
/// the directory suffix.
pub fn check_platform(item: &Item) -> DeployResult<()> {
    if item.item_type.is_lakehouse() {
        return Ok(());
    }

    let path = item.platform_path();
    let invalid = |message: String| DeployError::InvalidItem {
        path: item.path.clone(),
        message,
    };

    let content = std::fs::read_to_string(&path)
        .map_err(|e| invalid(format!("cannot read .platform: {}", e)))?;
    let platform = PlatformMetadata::from_json(&content)
        .map_err(|e| invalid(format!("malformed .platform: {}", e)))?;

    if platform.metadata.item_type != item.item_type {
        return Err(invalid(format!(
            ".platform declares type {} but the directory is a {}",
            platform.metadata.item_type, item.item_type
        )));
    }
    Ok(())
}

pub struct DeploymentSequencer {
    fabric: FabricClient,
    config: DeployConfig,
    options: DeployOptions,
}

impl DeploymentSequencer {
    /// `options.what_if` also switches `fabric` into what-if mode.
    pub fn new(fabric: FabricClient, config: DeployConfig, options: DeployOptions) -> Self {
        let what_if = options.what_if || fabric.is_what_if();
        Self {
            fabric: fabric.with_what_if(what_if),
            config,
            options,
        }
    }

    /// Deploy every item under `source` to `workspace_name`.
    ///
    /// Items are staged into a scratch copy first; the copy is removed on
    /// return. Any fatal error aborts the run without rollback.
    pub async fn deploy(
        &self,
        workspace_name: &str,
        source: &Path,
    ) -> DeployResult<DeploymentReport> {
        let run_id = RunId::new();
        let started_at = Utc::now();
        let workspace = normalize_workspace_name(workspace_name);
        info!(
            run_id = %run_id,
            workspace = %workspace,
            source = %source.display(),
            runner = self.fabric.runner_name(),
            timeout_secs = self.fabric.timeout().as_secs(),
            what_if = self.fabric.is_what_if(),
            "Starting deployment"
        );

        let staging = StagingArea::create(workspace, source, &self.config)?;
        let plan = plan_items(&self.config.deploy_order, staging.discover_items()?);
        for item in &plan.skipped {
            warn!(item = %item.qualified_name(), "No deploy step for item type, skipping");
        }
        for item in &plan.ordered {
            check_platform(item)?;
        }

        let mut bag = VariableBag::new().with(keys::WORKSPACE_NAME, workspace);
        let workspace_id = self.fabric.get(&workspace_path(workspace), "id").await?;
        info!(workspace = %workspace, id = %workspace_id, "Resolved workspace");
        bag.set(keys::WORKSPACE_ID, workspace_id.as_str());

        if let Some(conn) = &self.config.connection {
            let id = ensure_connection(&self.fabric, conn, &bag, &self.options.admin_upns).await?;
            bag.set(keys::CONNECTION_ID, id);
        }

        let mut deployed = Vec::with_capacity(plan.ordered.len());
        for item in &plan.ordered {
            let result = if item.item_type.is_lakehouse() {
                self.deploy_lakehouse(workspace, item, &mut bag).await
            } else {
                self.deploy_item(workspace, item, &mut bag).await
            };
            let id = result.inspect_err(|e| {
                error!(item = %item.qualified_name(), error = %e, "Item deployment failed");
            })?;
            info!(item = %item.qualified_name(), id = %id, "Deployed item");
            deployed.push(DeployedItem {
                name: item.name.clone(),
                item_type: item.item_type.clone(),
                id,
            });
        }

        let bound_models = if self.options.bind_semantic_models {
            self.bind_models(&deployed, &workspace_id, &mut bag).await?
        } else {
            Vec::new()
        };

        let mut pipelines_run = Vec::new();
        if self.options.run_pipelines {
            for item in deployed.iter().filter(|d| d.item_type.is(ItemType::DATA_PIPELINE)) {
                let name = item.qualified_name();
                info!(pipeline = %name, "Running pipeline");
                self.fabric.run_job(&item_path(workspace, &name)).await?;
                pipelines_run.push(name);
            }
        }

        let report = DeploymentReport {
            run_id,
            workspace_name: workspace.to_string(),
            workspace_id,
            what_if: self.fabric.is_what_if(),
            items: deployed,
            skipped: plan.skipped.iter().map(|i| i.qualified_name()).collect(),
            bound_models,
            pipelines_run,
            variables: bag,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            run_id = %report.run_id,
            items = report.items.len(),
            "Deployment finished"
        );
        Ok(report)
    }

    /// Lakehouses are created rather than imported, then their id and SQL
    /// endpoint are read back.
    async fn deploy_lakehouse(
        &self,
        workspace: &str,
        item: &Item,
        bag: &mut VariableBag,
    ) -> DeployResult<String> {
        let name = item.qualified_name();
        let path = item_path(workspace, &name);

        let exists = self.fabric.exists(&path).await?;
        if exists {
            info!(item = %name, "Lakehouse already exists");
        } else {
            info!(item = %name, "Creating lakehouse");
            let params = [("enableSchemas".to_string(), "true".to_string())];
            self.fabric.create(&path, &params, false).await?;
        }

        let (id, sql_endpoint) = if self.fabric.is_what_if() && !exists {
            let marker = what_if_marker(&name);
            (marker.clone(), marker)
        } else {
            (
                self.fabric.get_json(&path, "id").await?,
                self.fabric.get_json(&path, SQL_ENDPOINT_QUERY).await?,
            )
        };

        if let Some(previous) = bag.set(keys::LAKEHOUSE_ID, id.as_str()) {
            warn!(item = %name, previous = %previous, "Replacing lakehouse from an earlier item");
        }
        bag.set(keys::LAKEHOUSE_NAME, item.name.as_str());
        bag.set(keys::SQL_ENDPOINT, sql_endpoint);
        Ok(id)
    }

    async fn deploy_item(
        &self,
        workspace: &str,
        item: &Item,
        bag: &mut VariableBag,
    ) -> DeployResult<String> {
        let name = item.qualified_name();
        let path = item_path(workspace, &name);

        apply_item_rules(item, &self.config, bag, self.options.strict_patterns)?;

        info!(item = %name, "Importing item");
        self.fabric
            .import(&path, &item.path, item.item_type.import_format())
            .await?;

        let id = if self.fabric.is_what_if() && !self.fabric.exists(&path).await? {
            what_if_marker(&name)
        } else {
            self.fabric.get(&path, "id").await?
        };

        if item.item_type.is(ItemType::SEMANTIC_MODEL) {
            bag.set(keys::SEMANTICMODEL_ID, id.as_str());
        }
        Ok(id)
    }

    async fn bind_models(
        &self,
        deployed: &[DeployedItem],
        workspace_id: &str,
        bag: &mut VariableBag,
    ) -> DeployResult<Vec<String>> {
        let models: Vec<&DeployedItem> = deployed
            .iter()
            .filter(|d| d.item_type.is(ItemType::SEMANTIC_MODEL))
            .collect();
        if models.is_empty() {
            return Ok(Vec::new());
        }
        let Some(sql_connection) = &self.config.sql_connection else {
            warn!("No SQL connection configured, semantic models stay unbound");
            return Ok(Vec::new());
        };

        let connection_id =
            ensure_connection(&self.fabric, sql_connection, bag, &self.options.admin_upns).await?;
        bag.set(keys::SQL_CONNECTION_ID, connection_id.as_str());

        let sql_endpoint = bag.require(keys::SQL_ENDPOINT)?;
        let database = bag.require(keys::LAKEHOUSE_NAME)?;

        let mut bound = Vec::new();
        for model in models {
            let outcome = bind_semantic_model(
                &self.fabric,
                workspace_id,
                &model.id,
                &connection_id,
                sql_endpoint,
                database,
            )
            .await?;
            if outcome == BindOutcome::Bound {
                bound.push(model.qualified_name());
            }
        }
        Ok(bound)
    }
}
