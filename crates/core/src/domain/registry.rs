use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::version::Version;

/// Namespace under which all module bookkeeping is stored.
pub const MODULES_NAMESPACE: &str = "urn:modup:system:modules:1.0";

pub const PATH_MODULES: &str = "modules";
pub const PATH_COMPONENTS: &str = "components";

pub const PROPERTY_INSTALLED_VERSION: &str = "installedVersion";
pub const PROPERTY_CURRENT_VERSION: &str = "currentVersion";
pub const PROPERTY_EXECUTION_DATE: &str = "executionDate";

/// Hierarchical key identifying a single registry value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegistryKey {
    pub namespace: String,
    pub path: Vec<String>,
    pub property: String,
}

impl RegistryKey {
    pub fn new(
        namespace: impl Into<String>,
        path: impl IntoIterator<Item = impl Into<String>>,
        property: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            path: path.into_iter().map(Into::into).collect(),
            property: property.into(),
        }
    }

    /// `modules/<module_id>/<property>`
    pub fn module_property(module_id: &str, property: &str) -> Self {
        Self::new(MODULES_NAMESPACE, [PATH_MODULES, module_id], property)
    }

    /// `modules/<module_id>/components/<component>/<property>`
    pub fn component_property(module_id: &str, component: &str, property: &str) -> Self {
        Self::new(
            MODULES_NAMESPACE,
            [PATH_MODULES, module_id, PATH_COMPONENTS, component],
            property,
        )
    }

    pub fn installed_version(module_id: &str) -> Self {
        Self::module_property(module_id, PROPERTY_INSTALLED_VERSION)
    }

    pub fn current_version(module_id: &str) -> Self {
        Self::module_property(module_id, PROPERTY_CURRENT_VERSION)
    }

    pub fn execution_date(module_id: &str, component: &str) -> Self {
        Self::component_property(module_id, component, PROPERTY_EXECUTION_DATE)
    }

    /// Path segments joined with `/`, without namespace or property.
    pub fn path_string(&self) -> String {
        self.path.join("/")
    }
}

impl fmt::Display for RegistryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{{{}}}{}", self.namespace, self.property)
        } else {
            write!(
                f,
                "{{{}}}{}/{}",
                self.namespace,
                self.path_string(),
                self.property
            )
        }
    }
}

/// Typed value held by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum RegistryValue {
    Version(Version),
    Timestamp(DateTime<Utc>),
}

impl RegistryValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Version(_) => "version",
            Self::Timestamp(_) => "timestamp",
        }
    }

    pub fn as_version(&self) -> Option<&Version> {
        match self {
            Self::Version(version) => Some(version),
            Self::Timestamp(_) => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(ts) => Some(*ts),
            Self::Version(_) => None,
        }
    }
}

impl From<Version> for RegistryValue {
    fn from(version: Version) -> Self {
        Self::Version(version)
    }
}

impl From<DateTime<Utc>> for RegistryValue {
    fn from(ts: DateTime<Utc>) -> Self {
        Self::Timestamp(ts)
    }
}

impl fmt::Display for RegistryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Version(version) => write!(f, "{version}"),
            Self::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
        }
    }
}
