//! Core domain types and traits for fabdeploy.
//!
//! This crate contains:
//! - Run identifiers
//! - Fabric item types and on-disk item definitions
//! - The command runner trait used to talk to the Fabric CLI

pub mod error;
pub mod id;
pub mod item;
pub mod runner;

pub use error::{Error, Result};
pub use id::RunId;
pub use item::{Item, ItemType, PlatformMetadata};
pub use runner::{CommandOutput, CommandRunner};
