//! Registry of components grouped by owning module.

use indexmap::IndexMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::component::{ComponentDefinition, ModuleComponent};
use crate::error::ConfigurationError;

type ComponentsByName = IndexMap<String, Arc<ModuleComponent>>;

/// Components keyed by module id, then by component name.
///
/// Registration is serialized so independent subsystems may register
/// concurrently during startup. A dependency must be registered before its
/// dependents, which keeps every module's dependency graph acyclic.
#[derive(Default)]
pub struct ComponentCatalog {
    components_by_module: Mutex<IndexMap<String, ComponentsByName>>,
}

impl ComponentCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        definition: ComponentDefinition,
    ) -> Result<Arc<ModuleComponent>, ConfigurationError> {
        validate_identifier(&definition.module_id)?;
        validate_identifier(&definition.name)?;

        let mut modules = self.lock();
        let existing = modules.get(&definition.module_id);

        if existing.is_some_and(|components| components.contains_key(&definition.name)) {
            return Err(ConfigurationError::DuplicateComponent {
                module_id: definition.module_id,
                name: definition.name,
            });
        }

        let mut dependencies: Vec<Arc<ModuleComponent>> = Vec::new();
        for dependency in &definition.depends_on {
            if dependency == &definition.name {
                return Err(ConfigurationError::SelfDependency {
                    module_id: definition.module_id.clone(),
                    component: definition.name.clone(),
                });
            }
            let Some(resolved) = existing.and_then(|components| components.get(dependency)) else {
                return Err(ConfigurationError::UnknownDependency {
                    module_id: definition.module_id.clone(),
                    component: definition.name.clone(),
                    dependency: dependency.clone(),
                });
            };
            if !dependencies.iter().any(|d| Arc::ptr_eq(d, resolved)) {
                dependencies.push(Arc::clone(resolved));
            }
        }

        let component = Arc::new(ModuleComponent::resolved(definition, dependencies));
        modules
            .entry(component.module_id().to_string())
            .or_default()
            .insert(component.name().to_string(), Arc::clone(&component));

        debug!(
            module_id = %component.module_id(),
            component = %component.name(),
            applies = %component.applies(),
            once_only = component.is_execute_once_only(),
            "Registered component"
        );

        Ok(component)
    }

    /// Components of a module in registration order; empty for unknown modules.
    pub fn components_for(&self, module_id: &str) -> Vec<Arc<ModuleComponent>> {
        self.lock()
            .get(module_id)
            .map(|components| components.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get(&self, module_id: &str, name: &str) -> Option<Arc<ModuleComponent>> {
        self.lock()
            .get(module_id)
            .and_then(|components| components.get(name))
            .cloned()
    }

    /// Modules with at least one registered component, in registration order.
    pub fn module_ids(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<String, ComponentsByName>> {
        self.components_by_module
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }
}

/// Ids become registry path segments, so they must be non-empty and free of `/`.
pub(crate) fn validate_identifier(id: &str) -> Result<(), ConfigurationError> {
    if id.trim().is_empty() || id.contains('/') {
        return Err(ConfigurationError::InvalidIdentifier(id.to_string()));
    }
    Ok(())
}
