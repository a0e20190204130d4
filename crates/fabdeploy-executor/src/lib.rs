//! Command runners for fabdeploy.
//!
//! Provides the process-backed implementation of
//! [`CommandRunner`](fabdeploy_core::CommandRunner) that shells out to the
//! Fabric CLI.

pub mod fab;

pub use fab::FabCliRunner;
pub use fabdeploy_core::runner::{CommandOutput, CommandRunner};
