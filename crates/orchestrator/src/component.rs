//! Module components: the units of upgrade work a module declares.

use async_trait::async_trait;
use modup_core::{ModuleDetails, Version, VersionRange};
use sqlx::SqliteConnection;
use std::fmt;
use std::sync::Arc;

/// Everything a component may touch while it runs.
///
/// The connection belongs to the module's open transaction, so whatever a
/// component writes through it commits or rolls back with the module.
pub struct ComponentContext<'a> {
    pub module: &'a ModuleDetails,
    pub component: &'a str,
    pub connection: &'a mut SqliteConnection,
}

/// The executable body of a component.
#[async_trait]
pub trait ComponentUnit: Send + Sync {
    async fn execute(&self, ctx: &mut ComponentContext<'_>) -> anyhow::Result<()>;
}

/// Declaration of a component, before it is registered with a catalog.
pub struct ComponentDefinition {
    pub module_id: String,
    pub name: String,
    pub description: String,
    pub applies: VersionRange,
    pub execute_once_only: bool,
    pub depends_on: Vec<String>,
    pub unit: Arc<dyn ComponentUnit>,
}

impl ComponentDefinition {
    /// A once-only component applying to every module version.
    pub fn new(
        module_id: impl Into<String>,
        name: impl Into<String>,
        unit: impl ComponentUnit + 'static,
    ) -> Self {
        Self::with_unit(module_id, name, Arc::new(unit))
    }

    pub fn with_unit(
        module_id: impl Into<String>,
        name: impl Into<String>,
        unit: Arc<dyn ComponentUnit>,
    ) -> Self {
        Self {
            module_id: module_id.into(),
            name: name.into(),
            description: String::new(),
            applies: VersionRange::default(),
            execute_once_only: true,
            depends_on: Vec::new(),
            unit,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn applies_from(mut self, min: Version) -> Self {
        self.applies.min = min;
        self
    }

    pub fn applies_to(mut self, max: Version) -> Self {
        self.applies.max = Some(max);
        self
    }

    pub fn applies(mut self, range: VersionRange) -> Self {
        self.applies = range;
        self
    }

    pub fn once_only(mut self, once_only: bool) -> Self {
        self.execute_once_only = once_only;
        self
    }

    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(name.into());
        self
    }
}

/// A registered component with its dependencies resolved to direct references.
pub struct ModuleComponent {
    module_id: String,
    name: String,
    description: String,
    applies: VersionRange,
    execute_once_only: bool,
    dependencies: Vec<Arc<ModuleComponent>>,
    unit: Arc<dyn ComponentUnit>,
}

impl ModuleComponent {
    pub(crate) fn resolved(
        definition: ComponentDefinition,
        dependencies: Vec<Arc<ModuleComponent>>,
    ) -> Self {
        Self {
            module_id: definition.module_id,
            name: definition.name,
            description: definition.description,
            applies: definition.applies,
            execute_once_only: definition.execute_once_only,
            dependencies,
            unit: definition.unit,
        }
    }

    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn applies(&self) -> &VersionRange {
        &self.applies
    }

    pub fn is_execute_once_only(&self) -> bool {
        self.execute_once_only
    }

    pub fn dependencies(&self) -> &[Arc<ModuleComponent>] {
        &self.dependencies
    }

    pub(crate) fn unit(&self) -> &dyn ComponentUnit {
        self.unit.as_ref()
    }
}

impl fmt::Debug for ModuleComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dependencies: Vec<&str> = self.dependencies.iter().map(|d| d.name()).collect();
        f.debug_struct("ModuleComponent")
            .field("module_id", &self.module_id)
            .field("name", &self.name)
            .field("applies", &self.applies)
            .field("execute_once_only", &self.execute_once_only)
            .field("dependencies", &dependencies)
            .finish()
    }
}

impl fmt::Display for ModuleComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module_id, self.name)
    }
}
