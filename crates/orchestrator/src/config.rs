//! File-based module and component configuration.

use modup_core::{ModuleDetails, Version, VersionRange};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tracing::debug;

use crate::catalog::{validate_identifier, ComponentCatalog};
use crate::component::ComponentDefinition;
use crate::error::{ConfigurationError, Result};
use crate::module_source::StaticModuleSource;
use crate::shell::ShellCommandUnit;

pub const CONFIG_DIR: &str = ".modup";
pub const CONFIG_FILE: &str = "config.toml";
pub const DEFAULT_CONFIG_PATH: &str = ".modup/config.toml";
pub const DEFAULT_DATABASE_URL: &str = "sqlite:.modup/registry.db";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub id: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub components: Vec<ComponentConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Lowest module version the component applies to; `0` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applies_from: Option<String>,
    /// Highest module version the component applies to; `*` or absent is unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applies_to: Option<String>,
    #[serde(default = "default_once_only")]
    pub once_only: bool,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub command: Vec<String>,
}

fn default_once_only() -> bool {
    true
}

/// Contents of `.modup/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub modules: Vec<ModuleConfig>,
}

impl UpgradeConfig {
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        let config = Self::from_toml(&content)?;
        debug!(path = %path.display(), modules = config.modules.len(), "Config loaded");
        Ok(config)
    }

    pub async fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(path, content).await?;
        debug!(path = %path.display(), "Config saved");

        Ok(())
    }

    /// A config with one example module, written by `modup init`.
    pub fn starter() -> Self {
        Self {
            database: DatabaseConfig::default(),
            modules: vec![ModuleConfig {
                id: "example".to_string(),
                version: "1.0".to_string(),
                title: Some("Example module".to_string()),
                components: vec![ComponentConfig {
                    name: "initData".to_string(),
                    description: "Seed the example module".to_string(),
                    applies_from: Some("1.0".to_string()),
                    applies_to: None,
                    once_only: true,
                    depends_on: Vec::new(),
                    command: vec![
                        "sh".to_string(),
                        "-c".to_string(),
                        "echo \"initializing $MODUP_MODULE_ID $MODUP_MODULE_VERSION\"".to_string(),
                    ],
                }],
            }],
        }
    }

    /// The deployment feed described by this config.
    pub fn deployed_modules(&self) -> std::result::Result<Vec<ModuleDetails>, ConfigurationError> {
        let mut seen = HashSet::new();
        let mut modules = Vec::with_capacity(self.modules.len());

        for module in &self.modules {
            if !seen.insert(module.id.as_str()) {
                return Err(ConfigurationError::DuplicateModule(module.id.clone()));
            }
            validate_identifier(&module.id)?;
            let version = parse_version(&module.version, &module.id)?;
            let details = ModuleDetails::new(module.id.clone(), version);
            modules.push(match &module.title {
                Some(title) => details.with_title(title),
                None => details,
            });
        }

        Ok(modules)
    }

    pub fn module_source(&self) -> std::result::Result<StaticModuleSource, ConfigurationError> {
        Ok(StaticModuleSource::new(self.deployed_modules()?))
    }

    /// Validate every module's components and register them in dependency order.
    pub fn build_catalog(&self) -> std::result::Result<ComponentCatalog, ConfigurationError> {
        let catalog = ComponentCatalog::new();

        for module in &self.modules {
            for component in order_components(&module.id, &module.components)? {
                catalog.register(component_definition(&module.id, component)?)?;
            }
        }

        Ok(catalog)
    }
}

fn component_definition(
    module_id: &str,
    component: &ComponentConfig,
) -> std::result::Result<ComponentDefinition, ConfigurationError> {
    let context = format!("{module_id}:{}", component.name);

    let min = match &component.applies_from {
        Some(raw) => parse_version(raw, &context)?,
        None => Version::zero(),
    };
    let max = match &component.applies_to {
        Some(raw) => VersionRange::parse_bound(raw).map_err(|source| {
            ConfigurationError::InvalidVersion {
                context: context.clone(),
                source,
            }
        })?,
        None => None,
    };
    let range = VersionRange::new(min, max)
        .map_err(|source| ConfigurationError::InvalidVersion { context, source })?;

    let unit = ShellCommandUnit::from_argv(&component.command).ok_or_else(|| {
        ConfigurationError::MissingCommand {
            module_id: module_id.to_string(),
            component: component.name.clone(),
        }
    })?;

    let mut definition = ComponentDefinition::with_unit(module_id, &component.name, Arc::new(unit))
        .description(&component.description)
        .applies(range)
        .once_only(component.once_only);
    definition.depends_on = component.depends_on.clone();

    Ok(definition)
}

fn parse_version(raw: &str, context: &str) -> std::result::Result<Version, ConfigurationError> {
    Version::parse(raw).map_err(|source| ConfigurationError::InvalidVersion {
        context: context.to_string(),
        source,
    })
}

/// Order one module's components so every dependency precedes its dependents.
///
/// Components without mutual dependencies keep their declaration order.
fn order_components<'c>(
    module_id: &str,
    components: &'c [ComponentConfig],
) -> std::result::Result<Vec<&'c ComponentConfig>, ConfigurationError> {
    let mut lookup: HashMap<&str, usize> = HashMap::new();
    for (idx, component) in components.iter().enumerate() {
        if lookup.insert(component.name.as_str(), idx).is_some() {
            return Err(ConfigurationError::DuplicateComponent {
                module_id: module_id.to_string(),
                name: component.name.clone(),
            });
        }
    }

    let mut in_degrees = vec![0usize; components.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); components.len()];

    for (idx, component) in components.iter().enumerate() {
        let mut seen = HashSet::new();
        for dependency in &component.depends_on {
            if dependency == &component.name {
                return Err(ConfigurationError::SelfDependency {
                    module_id: module_id.to_string(),
                    component: component.name.clone(),
                });
            }
            let Some(&dep_idx) = lookup.get(dependency.as_str()) else {
                return Err(ConfigurationError::UnknownDependency {
                    module_id: module_id.to_string(),
                    component: component.name.clone(),
                    dependency: dependency.clone(),
                });
            };
            if !seen.insert(dep_idx) {
                continue;
            }
            in_degrees[idx] += 1;
            dependents[dep_idx].push(idx);
        }
    }

    let mut queue: VecDeque<usize> = (0..components.len())
        .filter(|idx| in_degrees[*idx] == 0)
        .collect();
    let mut ordered = Vec::with_capacity(components.len());

    while let Some(idx) = queue.pop_front() {
        ordered.push(&components[idx]);
        for &child in &dependents[idx] {
            in_degrees[child] -= 1;
            if in_degrees[child] == 0 {
                queue.push_back(child);
            }
        }
    }

    if ordered.len() != components.len() {
        let mut remaining: Vec<String> = components
            .iter()
            .zip(&in_degrees)
            .filter(|(_, degree)| **degree > 0)
            .map(|(component, _)| component.name.clone())
            .collect();
        remaining.sort();
        return Err(ConfigurationError::DependencyCycle {
            module_id: module_id.to_string(),
            components: remaining,
        });
    }

    Ok(ordered)
}
