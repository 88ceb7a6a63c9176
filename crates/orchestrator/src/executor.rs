use chrono::{DateTime, Utc};
use db::RegistryRepository;
use modup_core::{ModuleDetails, RegistryKey, Version, VersionRange};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::catalog::{validate_identifier, ComponentCatalog};
use crate::error::{OrchestratorError, Result};
use crate::identity::{IdentityProvider, PrivilegedScope, ProcessIdentity};
use crate::module_source::ModuleSource;
use crate::runner::RunState;
use crate::upgrader::{ModuleUpgrade, ModuleUpgrader};

/// A module whose upgrade was aborted and rolled back.
#[derive(Debug)]
pub struct ModuleFailure {
    pub module_id: String,
    pub component: Option<String>,
    pub error: OrchestratorError,
}

/// Outcome of one orchestrator run.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub modules_found: usize,
    pub upgrades: Vec<ModuleUpgrade>,
    pub failures: Vec<ModuleFailure>,
}

impl RunReport {
    fn new(modules_found: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            modules_found,
            upgrades: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Modules whose upgrade committed.
    pub fn modules_started(&self) -> usize {
        self.upgrades.len()
    }

    /// Components executed in committed modules.
    pub fn components_executed(&self) -> usize {
        self.upgrades.iter().map(|u| u.components_executed).sum()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn summary(&self) -> String {
        let mut line = format!(
            "Found {} module(s): started {}, executed {} component(s)",
            self.modules_found,
            self.modules_started(),
            self.components_executed()
        );
        if !self.failures.is_empty() {
            let failed: Vec<&str> = self.failures.iter().map(|f| f.module_id.as_str()).collect();
            line.push_str(&format!(
                ", {} failed ({})",
                self.failures.len(),
                failed.join(", ")
            ));
        }
        line
    }
}

/// Registry state of a single catalogued component.
#[derive(Debug, Clone)]
pub struct ComponentStatus {
    pub name: String,
    pub applies: VersionRange,
    pub execute_once_only: bool,
    pub executed_at: Option<DateTime<Utc>>,
}

/// Registry state of a module.
#[derive(Debug, Clone)]
pub struct ModuleStatus {
    pub module_id: String,
    pub installed_version: Option<Version>,
    pub current_version: Option<Version>,
    pub components: Vec<ComponentStatus>,
}

/// Brings every deployed module up to its deployed version.
///
/// Each module is upgraded in its own transaction under the system identity;
/// a failing module is rolled back and reported without affecting the others.
pub struct ModuleOrchestrator {
    catalog: Arc<ComponentCatalog>,
    registry: RegistryRepository,
    modules: Arc<dyn ModuleSource>,
    identity: Arc<dyn IdentityProvider>,
    run_lock: Mutex<()>,
}

impl ModuleOrchestrator {
    pub fn new(
        catalog: Arc<ComponentCatalog>,
        registry: RegistryRepository,
        modules: Arc<dyn ModuleSource>,
    ) -> Self {
        Self {
            catalog,
            registry,
            modules,
            identity: Arc::new(ProcessIdentity::default()),
            run_lock: Mutex::new(()),
        }
    }

    pub fn with_identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = identity;
        self
    }

    pub fn catalog(&self) -> &ComponentCatalog {
        &self.catalog
    }

    /// Upgrade all deployed modules, one at a time.
    ///
    /// Only module discovery failing is an error here; module failures are
    /// collected in the report.
    pub async fn run(&self) -> Result<RunReport> {
        let _running = self.run_lock.lock().await;

        let modules = self.modules.modules().await?;
        let mut report = RunReport::new(modules.len());
        info!(
            run_id = %report.run_id,
            components = self.catalog.len(),
            "Found {} module(s)",
            modules.len()
        );

        for module_id in self.catalog.module_ids() {
            if !modules.iter().any(|m| m.id == module_id) {
                warn!(
                    run_id = %report.run_id,
                    module_id = %module_id,
                    "Components registered for a module that is not deployed"
                );
            }
        }

        for module in &modules {
            match self.start_module(module).await {
                Ok(upgrade) => report.upgrades.push(upgrade),
                Err(e) => {
                    error!(
                        run_id = %report.run_id,
                        module_id = %module.id,
                        component = e.component().unwrap_or("-"),
                        error = %e,
                        "Module upgrade failed, changes rolled back"
                    );
                    report.failures.push(ModuleFailure {
                        module_id: module.id.clone(),
                        component: e.component().map(str::to_string),
                        error: e,
                    });
                }
            }
        }

        info!(run_id = %report.run_id, "{}", report.summary());

        Ok(report)
    }

    /// Upgrade one module in its own transaction under the system identity.
    async fn start_module(&self, module: &ModuleDetails) -> Result<ModuleUpgrade> {
        validate_identifier(&module.id)?;

        let _privileged = PrivilegedScope::enter(Arc::clone(&self.identity));

        let mut tx = self.registry.begin().await?;
        let mut run_state = RunState::new();

        let result = ModuleUpgrader::new(&self.catalog)
            .upgrade(module, &mut tx, &mut run_state)
            .await;

        match result {
            Ok(upgrade) => {
                tx.commit().await?;
                debug!(module_id = %module.id, "Module transaction committed");
                Ok(upgrade)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(
                        module_id = %module.id,
                        error = %rollback_err,
                        "Rollback failed"
                    );
                }
                Err(e)
            }
        }
    }

    /// Installed/current versions and execution dates recorded for a module.
    pub async fn module_status(&self, module_id: &str) -> Result<ModuleStatus> {
        let installed_version = self
            .registry
            .get_version(&RegistryKey::installed_version(module_id))
            .await?;
        let current_version = self
            .registry
            .get_version(&RegistryKey::current_version(module_id))
            .await?;

        let mut components = Vec::new();
        for component in self.catalog.components_for(module_id) {
            let executed_at = self
                .registry
                .get_timestamp(&RegistryKey::execution_date(module_id, component.name()))
                .await?;
            components.push(ComponentStatus {
                name: component.name().to_string(),
                applies: component.applies().clone(),
                execute_once_only: component.is_execute_once_only(),
                executed_at,
            });
        }

        Ok(ModuleStatus {
            module_id: module_id.to_string(),
            installed_version,
            current_version,
            components,
        })
    }
}
