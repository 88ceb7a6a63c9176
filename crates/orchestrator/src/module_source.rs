use async_trait::async_trait;
use modup_core::ModuleDetails;

use crate::error::Result;

/// Discovers the modules deployed in this process.
#[async_trait]
pub trait ModuleSource: Send + Sync {
    async fn modules(&self) -> Result<Vec<ModuleDetails>>;
}

/// A fixed list of modules known up front.
#[derive(Debug, Clone, Default)]
pub struct StaticModuleSource {
    modules: Vec<ModuleDetails>,
}

impl StaticModuleSource {
    pub fn new(modules: Vec<ModuleDetails>) -> Self {
        Self { modules }
    }
}

#[async_trait]
impl ModuleSource for StaticModuleSource {
    async fn modules(&self) -> Result<Vec<ModuleDetails>> {
        Ok(self.modules.clone())
    }
}
