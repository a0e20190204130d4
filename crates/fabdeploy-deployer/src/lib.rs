//! Deployment of Fabric items for fabdeploy.
//!
//! Provides:
//! - [`FabricClient`]: typed Fabric CLI operations over a command runner
//! - Staging of the item tree into a scratch directory
//! - Per-item file substitution
//! - [`DeploymentSequencer`]: the ordered deployment pass

pub mod connection;
pub mod error;
pub mod fabric;
pub mod sequencer;
pub mod staging;
pub mod substitute;

#[cfg(test)]
pub(crate) mod testing;

pub use connection::BindOutcome;
pub use error::{DeployError, DeployResult};
pub use fabric::FabricClient;
pub use sequencer::{
    DeployOptions, DeployPlan, DeployedItem, DeploymentReport, DeploymentSequencer,
    check_platform, normalize_workspace_name, plan_items,
};
pub use staging::{StagingArea, discover_items};
