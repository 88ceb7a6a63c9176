//! Dependency-ordered execution of a single component.

use chrono::{DateTime, Utc};
use db::RegistryTransaction;
use futures::future::BoxFuture;
use indexmap::IndexSet;
use modup_core::{ModuleDetails, RegistryKey};
use std::sync::Arc;
use tracing::{debug, info};

use crate::component::{ComponentContext, ModuleComponent};
use crate::error::{OrchestratorError, Result};

/// What happened to a component when it was reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentOutcome {
    Executed,
    /// Already executed earlier in this run.
    SkippedThisRun,
    /// The module version lies outside the component's range.
    SkippedOutOfRange,
    /// Once-only component with a recorded execution date.
    SkippedAlreadyExecuted { executed_at: DateTime<Utc> },
}

/// Components executed during one pass, in execution order.
#[derive(Debug, Default)]
pub struct RunState {
    executed: IndexSet<(String, String)>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, component: &ModuleComponent) -> bool {
        self.executed
            .contains(&(component.module_id().to_string(), component.name().to_string()))
    }

    fn mark_executed(&mut self, component: &ModuleComponent) {
        self.executed
            .insert((component.module_id().to_string(), component.name().to_string()));
    }

    pub fn executed_count(&self) -> usize {
        self.executed.len()
    }
}

/// Runs components of one module inside that module's transaction.
///
/// The dependency graph must be acyclic. The catalog guarantees this for
/// every component it hands out.
pub struct ComponentRunner<'a> {
    module: &'a ModuleDetails,
    tx: &'a mut RegistryTransaction,
    run_state: &'a mut RunState,
}

impl<'a> ComponentRunner<'a> {
    pub fn new(
        module: &'a ModuleDetails,
        tx: &'a mut RegistryTransaction,
        run_state: &'a mut RunState,
    ) -> Self {
        Self {
            module,
            tx,
            run_state,
        }
    }

    /// Execute `component` after its dependencies, unless it is skipped.
    ///
    /// Unit failures propagate immediately; nothing written so far is undone
    /// here, that is left to the enclosing transaction.
    pub fn execute<'s>(
        &'s mut self,
        component: &'s Arc<ModuleComponent>,
    ) -> BoxFuture<'s, Result<ComponentOutcome>> {
        Box::pin(async move {
            if self.run_state.contains(component) {
                debug!(
                    component = %component,
                    "Skipping component already executed in this run"
                );
                return Ok(ComponentOutcome::SkippedThisRun);
            }

            let module_version = &self.module.version;
            if !component.applies().contains(module_version) {
                debug!(
                    component = %component,
                    module_id = %self.module.id,
                    version = %module_version,
                    applies = %component.applies(),
                    "Skipping component that doesn't apply to the current version"
                );
                return Ok(ComponentOutcome::SkippedOutOfRange);
            }

            let execution_date_key =
                RegistryKey::execution_date(component.module_id(), component.name());
            let executed_at = self.tx.get_timestamp(&execution_date_key).await?;
            if let Some(executed_at) = executed_at {
                if component.is_execute_once_only() {
                    debug!(
                        component = %component,
                        executed_at = %executed_at,
                        "Skipping already-executed module component"
                    );
                    return Ok(ComponentOutcome::SkippedAlreadyExecuted { executed_at });
                }
            }

            for dependency in component.dependencies() {
                self.execute(dependency).await?;
            }

            let mut ctx = ComponentContext {
                module: self.module,
                component: component.name(),
                connection: self.tx.connection(),
            };
            component.unit().execute(&mut ctx).await.map_err(|e| {
                OrchestratorError::component_failed(&self.module.id, component.name(), e)
            })?;

            self.run_state.mark_executed(component);
            self.tx
                .set_value(&execution_date_key, &Utc::now().into())
                .await?;

            info!(component = %component, "Executed module component");

            Ok(ComponentOutcome::Executed)
        })
    }
}
