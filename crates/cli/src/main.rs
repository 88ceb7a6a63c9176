use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use db::RegistryRepository;
use orchestrator::{ModuleOrchestrator, StaticModuleSource, UpgradeConfig, DEFAULT_CONFIG_PATH};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "modup")]
#[command(about = "Bring deployed modules up to their deployed versions", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the upgrade configuration
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter configuration and create the registry database
    Init,
    /// Upgrade every configured module
    Run,
    /// Show the registry state of every configured module
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Commands::Init => init(&cli.config).await,
        Commands::Run => run(&cli.config).await,
        Commands::Status => status(&cli.config).await,
    }
}

async fn init(config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("Already initialized at {}", config_path.display());
        return Ok(());
    }

    let config = UpgradeConfig::starter();
    config
        .write(config_path)
        .await
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    open_registry(&config).await?;

    println!("Created {}", config_path.display());
    println!("Registry: {}", config.database.url);
    println!();
    println!("Next steps:");
    println!("  1. Declare your modules and components in {}", config_path.display());
    println!("  2. Run 'modup run'");

    Ok(())
}

async fn run(config_path: &Path) -> Result<()> {
    let config = load_config(config_path).await?;
    let catalog = config
        .build_catalog()
        .context("Invalid component configuration")?;
    if catalog.is_empty() {
        tracing::warn!("No components configured; modules will only record their versions");
    }
    let modules = config
        .module_source()
        .context("Invalid module configuration")?;
    let registry = open_registry(&config).await?;

    let orchestrator = ModuleOrchestrator::new(Arc::new(catalog), registry, Arc::new(modules));
    let report = orchestrator.run().await.context("Upgrade run aborted")?;

    println!("{}", report.summary());
    for failure in &report.failures {
        match &failure.component {
            Some(component) => println!("  ✗ {}:{}: {}", failure.module_id, component, failure.error),
            None => println!("  ✗ {}: {}", failure.module_id, failure.error),
        }
    }

    if !report.is_success() {
        bail!("{} module(s) failed to upgrade", report.failures.len());
    }

    Ok(())
}

async fn status(config_path: &Path) -> Result<()> {
    let config = load_config(config_path).await?;
    let catalog = config
        .build_catalog()
        .context("Invalid component configuration")?;
    let modules = config
        .deployed_modules()
        .context("Invalid module configuration")?;
    let registry = open_registry(&config).await?;

    let orchestrator = ModuleOrchestrator::new(
        Arc::new(catalog),
        registry,
        Arc::new(StaticModuleSource::new(modules.clone())),
    );

    println!();
    if modules.is_empty() {
        println!("No modules configured.");
    }

    for module in &modules {
        let status = orchestrator.module_status(&module.id).await?;
        let current = status
            .current_version
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "-".to_string());
        let installed = status
            .installed_version
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "-".to_string());
        let marker = match &status.current_version {
            None => "○",
            Some(current) if current == &module.version => "●",
            Some(_) => "◐",
        };

        println!(
            "{} {} deployed {}, current {}, installed {}",
            marker, module.id, module.version, current, installed
        );
        for component in &status.components {
            let executed = component
                .executed_at
                .map(|at| at.to_rfc3339())
                .unwrap_or_else(|| "never".to_string());
            let once = if component.execute_once_only { "once" } else { "always" };
            println!(
                "    {} {} [{}] executed {}",
                component.name, component.applies, once, executed
            );
        }
    }
    println!();

    Ok(())
}

async fn load_config(path: &Path) -> Result<UpgradeConfig> {
    if !path.exists() {
        bail!(
            "No configuration at {}. Run 'modup init' first.",
            path.display()
        );
    }
    UpgradeConfig::load(path)
        .await
        .with_context(|| format!("Failed to load {}", path.display()))
}

async fn open_registry(config: &UpgradeConfig) -> Result<RegistryRepository> {
    let pool = db::create_pool(&config.database.url)
        .await
        .context("Failed to create database pool")?;
    db::run_migrations(&pool).await?;
    tracing::info!("Registry: {}", config.database.url);
    Ok(RegistryRepository::new(pool))
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "modup=info,orchestrator=info,db=info".into()),
        )
        .init();
}
