//! Deploy command.

use anyhow::{Context, Result};
use clap::Args;
use fabdeploy_config::DeployConfig;
use fabdeploy_deployer::{DeployOptions, DeploymentReport, DeploymentSequencer, FabricClient};
use fabdeploy_executor::FabCliRunner;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Args)]
pub struct DeployArgs {
    /// Target workspace; a trailing `.Workspace` is ignored
    #[arg(long)]
    pub workspace_name: String,

    /// Directory holding `<name>.<Type>` item folders
    #[arg(long, default_value = "src")]
    pub source: PathBuf,

    /// Deploy table overrides (KDL)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Identities granted admin on created connections
    #[arg(long, env = "FABRIC_ADMIN_UPNS", value_delimiter = ',')]
    pub admin_upns: Vec<String>,

    /// Upper bound for a single fab command, in seconds
    #[arg(long, default_value = "300")]
    pub timeout_secs: u64,

    /// Print mutating commands instead of running them
    #[arg(long)]
    pub what_if: bool,

    /// Fail when a substitution pattern matches nothing
    #[arg(long)]
    pub strict_patterns: bool,

    /// Bind deployed semantic models to the lakehouse SQL endpoint
    #[arg(long)]
    pub bind_semantic_model: bool,

    /// Run deployed data pipelines once
    #[arg(long)]
    pub run_pipelines: bool,

    /// Print the deployment report as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(fab_bin: &str, args: DeployArgs) -> Result<()> {
    let config = DeployConfig::load(args.config.as_deref()).with_context(|| match &args.config {
        Some(path) => format!("loading {}", path.display()),
        None => "loading built-in deploy table".to_string(),
    })?;

    info!(
        order = ?config.deploy_order.iter().map(|t| t.as_str()).collect::<Vec<_>>(),
        fab = %fab_bin,
        "Loaded deploy table"
    );

    let runner = Arc::new(FabCliRunner::with_binary(fab_bin));
    let fabric = FabricClient::new(runner).with_timeout(Duration::from_secs(args.timeout_secs));

    let options = DeployOptions {
        what_if: args.what_if,
        strict_patterns: args.strict_patterns,
        bind_semantic_models: args.bind_semantic_model,
        run_pipelines: args.run_pipelines,
        admin_upns: args.admin_upns,
    };

    let report = DeploymentSequencer::new(fabric, config, options)
        .deploy(&args.workspace_name, &args.source)
        .await
        .with_context(|| format!("deploying to {}", args.workspace_name))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }
    Ok(())
}

fn print_summary(report: &DeploymentReport) {
    let mode = if report.what_if { " (what-if)" } else { "" };
    println!(
        "Deployed {} item(s) to {} [{}]{}",
        report.items.len(),
        report.workspace_name,
        report.workspace_id,
        mode
    );
    for item in &report.items {
        println!("  {:<40} {}", item.qualified_name(), item.id);
    }
    if !report.skipped.is_empty() {
        println!("Skipped: {}", report.skipped.join(", "));
    }
    if !report.bound_models.is_empty() {
        println!("Bound: {}", report.bound_models.join(", "));
    }
    if !report.pipelines_run.is_empty() {
        println!("Ran: {}", report.pipelines_run.join(", "));
    }
    if !report.variables.is_empty() {
        println!("Variables:");
        for (name, value) in report.variables.iter() {
            println!("  {:<20} {}", name, value);
        }
    }
    let elapsed = report.finished_at - report.started_at;
    println!("Run {} took {}s", report.run_id, elapsed.num_seconds());
}
