//! Upgrade orchestration for versioned modules.
//!
//! Every deployed module is compared against the versions recorded in the
//! registry and its components are run, dependencies first, inside one
//! transaction per module.

pub mod catalog;
pub mod component;
pub mod config;
pub mod error;
pub mod executor;
pub mod identity;
pub mod module_source;
pub mod runner;
pub mod shell;
pub mod upgrader;

pub use catalog::ComponentCatalog;
pub use component::{ComponentContext, ComponentDefinition, ComponentUnit, ModuleComponent};
pub use config::{ComponentConfig, DEFAULT_CONFIG_PATH, DatabaseConfig, ModuleConfig, UpgradeConfig};
pub use error::{ConfigurationError, OrchestratorError, Result};
pub use executor::{ComponentStatus, ModuleFailure, ModuleOrchestrator, ModuleStatus, RunReport};
pub use identity::{Identity, IdentityProvider, PrivilegedScope, ProcessIdentity};
pub use module_source::{ModuleSource, StaticModuleSource};
pub use runner::{ComponentOutcome, ComponentRunner, RunState};
pub use shell::ShellCommandUnit;
pub use upgrader::{ModuleState, ModuleUpgrade, ModuleUpgrader};
