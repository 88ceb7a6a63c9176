use db::RegistryTransaction;
use modup_core::{ModuleDetails, RegistryKey, Version};
use tracing::{debug, info};

use crate::catalog::ComponentCatalog;
use crate::error::{OrchestratorError, Result};
use crate::runner::{ComponentOutcome, ComponentRunner, RunState};

/// Where a module stands relative to the version recorded in the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleState {
    NotInstalled,
    SameVersion,
    Upgrading { from: Version },
    DowngradeRejected { stored: Version },
}

impl ModuleState {
    pub fn evaluate(stored_current: Option<&Version>, deployed: &Version) -> Self {
        match stored_current {
            None => Self::NotInstalled,
            Some(stored) if stored == deployed => Self::SameVersion,
            Some(stored) if stored > deployed => Self::DowngradeRejected {
                stored: stored.clone(),
            },
            Some(stored) => Self::Upgrading {
                from: stored.clone(),
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotInstalled => "not_installed",
            Self::SameVersion => "same_version",
            Self::Upgrading { .. } => "upgrading",
            Self::DowngradeRejected { .. } => "downgrade_rejected",
        }
    }
}

/// Result of bringing one module up to its deployed version.
#[derive(Debug, Clone)]
pub struct ModuleUpgrade {
    pub module_id: String,
    pub state: ModuleState,
    pub outcomes: Vec<(String, ComponentOutcome)>,
    pub components_executed: usize,
}

/// Drives one module through the version gate and its components.
pub struct ModuleUpgrader<'a> {
    catalog: &'a ComponentCatalog,
}

impl<'a> ModuleUpgrader<'a> {
    pub fn new(catalog: &'a ComponentCatalog) -> Self {
        Self { catalog }
    }

    /// Upgrade `module` inside `tx`. A downgrade fails before any write.
    pub async fn upgrade(
        &self,
        module: &ModuleDetails,
        tx: &mut RegistryTransaction,
        run_state: &mut RunState,
    ) -> Result<ModuleUpgrade> {
        let deployed = &module.version;
        let current_key = RegistryKey::current_version(&module.id);
        let stored = tx.get_version(&current_key).await?;

        let state = ModuleState::evaluate(stored.as_ref(), deployed);
        match &state {
            ModuleState::DowngradeRejected { stored } => {
                return Err(OrchestratorError::downgrade(
                    &module.id,
                    stored.clone(),
                    deployed.clone(),
                ));
            }
            ModuleState::NotInstalled => {
                info!(module_id = %module.id, version = %deployed, "Installing module");
                tx.set_value(&RegistryKey::installed_version(&module.id), &deployed.clone().into())
                    .await?;
            }
            ModuleState::SameVersion => {
                info!(module_id = %module.id, version = %deployed, "Starting module");
            }
            ModuleState::Upgrading { from } => {
                info!(
                    module_id = %module.id,
                    version = %deployed,
                    from = %from,
                    "Upgrading module"
                );
            }
        }

        let executed_before = run_state.executed_count();
        let mut outcomes = Vec::new();
        {
            let mut runner = ComponentRunner::new(module, tx, run_state);
            for component in self.catalog.components_for(&module.id) {
                let outcome = runner.execute(&component).await?;
                outcomes.push((component.name().to_string(), outcome));
            }
        }

        tx.set_value(&current_key, &deployed.clone().into()).await?;

        let components_executed = run_state.executed_count() - executed_before;
        debug!(
            module_id = %module.id,
            state = state.as_str(),
            components_executed,
            "Started module"
        );

        Ok(ModuleUpgrade {
            module_id: module.id.clone(),
            state,
            outcomes,
            components_executed,
        })
    }
}
