//! Component unit that runs an external command.

use anyhow::{bail, Context};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::component::{ComponentContext, ComponentUnit};

pub const ENV_MODULE_ID: &str = "MODUP_MODULE_ID";
pub const ENV_MODULE_VERSION: &str = "MODUP_MODULE_VERSION";
pub const ENV_COMPONENT: &str = "MODUP_COMPONENT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommandUnit {
    program: String,
    args: Vec<String>,
}

impl ShellCommandUnit {
    /// Build from an argv; `None` when it is empty.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl ComponentUnit for ShellCommandUnit {
    async fn execute(&self, ctx: &mut ComponentContext<'_>) -> anyhow::Result<()> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .env(ENV_MODULE_ID, &ctx.module.id)
            .env(ENV_MODULE_VERSION, ctx.module.version.to_string())
            .env(ENV_COMPONENT, ctx.component)
            .output()
            .await
            .with_context(|| format!("failed to spawn '{}'", self.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "'{}' exited with {}: {}",
                self.display(),
                output.status,
                stderr.trim()
            );
        }

        debug!(
            component = %ctx.component,
            stdout = %String::from_utf8_lossy(&output.stdout).trim(),
            "Command finished"
        );

        Ok(())
    }
}
