use modup_core::{CoreError, Version};
use thiserror::Error;

/// Problems in the component definitions themselves.
///
/// These are raised while the catalog is being built and stop the process
/// before any module is upgraded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Component '{name}' has already been registered for module '{module_id}'")]
    DuplicateComponent { module_id: String, name: String },

    #[error("Component '{component}' of module '{module_id}' depends on unknown component '{dependency}'")]
    UnknownDependency {
        module_id: String,
        component: String,
        dependency: String,
    },

    #[error("Component '{component}' of module '{module_id}' cannot depend on itself")]
    SelfDependency { module_id: String, component: String },

    #[error("Dependency cycle in module '{module_id}' involving: {}", components.join(", "))]
    DependencyCycle {
        module_id: String,
        components: Vec<String>,
    },

    #[error("Invalid identifier '{0}': must be non-empty and must not contain '/'")]
    InvalidIdentifier(String),

    #[error("Duplicate module '{0}' in configuration")]
    DuplicateModule(String),

    #[error("Component '{component}' of module '{module_id}' has no command")]
    MissingCommand { module_id: String, component: String },

    #[error("Invalid version for '{context}': {source}")]
    InvalidVersion {
        context: String,
        #[source]
        source: CoreError,
    },
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Downgrading module '{module_id}' from {stored} to {deployed} is not supported")]
    Downgrade {
        module_id: String,
        stored: Version,
        deployed: Version,
    },

    #[error("Component '{component}' of module '{module_id}' failed: {source}")]
    ComponentFailed {
        module_id: String,
        component: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] db::DbError),

    #[error("Module discovery failed: {0}")]
    ModuleDiscovery(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl OrchestratorError {
    /// Create a downgrade error.
    pub fn downgrade(module_id: impl Into<String>, stored: Version, deployed: Version) -> Self {
        Self::Downgrade {
            module_id: module_id.into(),
            stored,
            deployed,
        }
    }

    /// Create a component failure error.
    pub fn component_failed(
        module_id: impl Into<String>,
        component: impl Into<String>,
        source: anyhow::Error,
    ) -> Self {
        Self::ComponentFailed {
            module_id: module_id.into(),
            component: component.into(),
            source,
        }
    }

    /// The component that raised this error, if any.
    pub fn component(&self) -> Option<&str> {
        match self {
            Self::ComponentFailed { component, .. } => Some(component),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
