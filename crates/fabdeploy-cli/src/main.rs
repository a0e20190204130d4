//! fabdeploy CLI tool.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::deploy::DeployArgs;

#[derive(Parser)]
#[command(name = "fabdeploy")]
#[command(about = "Deploy Microsoft Fabric items through the Fabric CLI", long_about = None)]
struct Cli {
    /// Fabric CLI binary
    #[arg(long, global = true, env = "FAB_BIN", default_value = "fab")]
    fab_bin: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy items to a workspace
    Deploy(DeployArgs),
    /// Show the order items would be deployed in
    Plan {
        /// Directory holding `<name>.<Type>` item folders
        #[arg(long, default_value = "src")]
        source: PathBuf,
        /// Deploy table overrides (KDL)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Validate a deploy configuration file
    Validate {
        /// Path to the configuration file
        #[arg(long, default_value = "fabdeploy.kdl")]
        config: PathBuf,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Commands::Deploy(args) => {
            commands::deploy::run(&cli.fab_bin, args).await?;
        }
        Commands::Plan { source, config } => {
            commands::plan(&source, config.as_deref())?;
        }
        Commands::Validate { config } => {
            commands::validate(&config)?;
        }
    }

    Ok(())
}
