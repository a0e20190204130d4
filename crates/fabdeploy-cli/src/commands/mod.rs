//! CLI command implementations.

pub mod deploy;

use anyhow::{Context, Result};
use fabdeploy_config::DeployConfig;
use fabdeploy_deployer::{check_platform, discover_items, plan_items};
use std::path::Path;

pub fn plan(source: &Path, config: Option<&Path>) -> Result<()> {
    let config = DeployConfig::load(config).context("loading deploy table")?;
    let items = discover_items(source)
        .with_context(|| format!("reading items from {}", source.display()))?;
    let plan = plan_items(&config.deploy_order, items);

    for (idx, item) in plan.ordered.iter().enumerate() {
        match check_platform(item) {
            Ok(()) => println!("{:>3}. {}", idx + 1, item.qualified_name()),
            Err(e) => println!("{:>3}. {}  ! {}", idx + 1, item.qualified_name(), e),
        }
    }
    for item in &plan.skipped {
        println!("  -  {} (no deploy step)", item.qualified_name());
    }
    if plan.ordered.is_empty() {
        println!("No deployable items in {}", source.display());
    }
    Ok(())
}

pub fn validate(path: &Path) -> Result<()> {
    let config = DeployConfig::load(Some(path))
        .with_context(|| format!("configuration error in {}", path.display()))?;

    let order: Vec<String> = config.deploy_order.iter().map(|t| t.to_string()).collect();
    println!("Configuration is valid");
    println!("  deploy order: {}", order.join(", "));
    for item_type in &config.deploy_order {
        if let Some(files) = config.file_rules(item_type) {
            for (file, rules) in files {
                println!("  {} {}: {} rule(s)", item_type, file, rules.len());
            }
        }
    }
    Ok(())
}
