//! Deployment configuration for fabdeploy.
//!
//! This crate handles:
//! - The variable bag and `$placeholder` templates
//! - Regex substitution rules applied to item files
//! - The deploy table (built-in defaults and KDL overrides)

pub mod defaults;
pub mod deploy;
pub mod error;
pub mod substitution;
pub mod variables;

pub use deploy::{ConnectionConfig, DeployConfig, FileRules};
pub use error::{ConfigError, ConfigResult};
pub use substitution::{Substituted, SubstitutionRule, apply_all};
pub use variables::{Replacement, Template, VariableBag, keys};
