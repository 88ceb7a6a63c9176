use async_trait::async_trait;
use db::{create_memory_pool, run_migrations, RegistryRepository};
use modup_core::{ModuleDetails, RegistryKey, Version, MODULES_NAMESPACE, PATH_MODULES};
use orchestrator::{
    ComponentCatalog, ComponentContext, ComponentDefinition, ComponentOutcome, ComponentUnit,
    ModuleOrchestrator, ModuleState, OrchestratorError, StaticModuleSource,
};
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| *e == entry).count()
    }
}

/// Records `module:component` on every invocation.
struct Recording {
    journal: Journal,
}

#[async_trait]
impl ComponentUnit for Recording {
    async fn execute(&self, ctx: &mut ComponentContext<'_>) -> anyhow::Result<()> {
        self.journal
            .0
            .lock()
            .unwrap()
            .push(format!("{}:{}", ctx.module.id, ctx.component));
        Ok(())
    }
}

/// Writes a row through the module transaction.
struct Seed;

#[async_trait]
impl ComponentUnit for Seed {
    async fn execute(&self, ctx: &mut ComponentContext<'_>) -> anyhow::Result<()> {
        sqlx::query("CREATE TABLE IF NOT EXISTS seeded (module TEXT NOT NULL)")
            .execute(&mut *ctx.connection)
            .await?;
        sqlx::query("INSERT INTO seeded (module) VALUES (?)")
            .bind(&ctx.module.id)
            .execute(&mut *ctx.connection)
            .await?;
        Ok(())
    }
}

struct Failing;

#[async_trait]
impl ComponentUnit for Failing {
    async fn execute(&self, _ctx: &mut ComponentContext<'_>) -> anyhow::Result<()> {
        anyhow::bail!("disk full")
    }
}

fn v(s: &str) -> Version {
    Version::parse(s).unwrap()
}

async fn setup_registry() -> RegistryRepository {
    let pool = create_memory_pool().await.expect("Failed to create pool");
    run_migrations(&pool).await.expect("Failed to run migrations");
    RegistryRepository::new(pool)
}

fn orchestrator(
    catalog: ComponentCatalog,
    registry: &RegistryRepository,
    modules: Vec<ModuleDetails>,
) -> ModuleOrchestrator {
    ModuleOrchestrator::new(
        Arc::new(catalog),
        registry.clone(),
        Arc::new(StaticModuleSource::new(modules)),
    )
}

fn recording(journal: &Journal, module_id: &str, name: &str) -> ComponentDefinition {
    ComponentDefinition::new(
        module_id,
        name,
        Recording {
            journal: journal.clone(),
        },
    )
}

async fn executed_at(
    registry: &RegistryRepository,
    module_id: &str,
    component: &str,
) -> Option<chrono::DateTime<chrono::Utc>> {
    registry
        .get_timestamp(&RegistryKey::execution_date(module_id, component))
        .await
        .unwrap()
}

async fn seeded_rows(registry: &RegistryRepository) -> Vec<String> {
    sqlx::query_scalar("SELECT module FROM seeded ORDER BY module")
        .fetch_all(registry.pool())
        .await
        .unwrap_or_default()
}

#[tokio::test]
async fn test_fresh_install_records_versions_and_execution() {
    let registry = setup_registry().await;
    let journal = Journal::default();
    let catalog = ComponentCatalog::new();
    catalog
        .register(recording(&journal, "foo", "initData").applies_from(v("1.0")))
        .unwrap();

    let report = orchestrator(catalog, &registry, vec![ModuleDetails::new("foo", v("2.0"))])
        .run()
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.modules_found, 1);
    assert_eq!(report.modules_started(), 1);
    assert_eq!(report.components_executed(), 1);
    assert_eq!(report.upgrades[0].state, ModuleState::NotInstalled);
    assert_eq!(journal.entries(), vec!["foo:initData"]);

    assert_eq!(
        registry
            .get_version(&RegistryKey::installed_version("foo"))
            .await
            .unwrap(),
        Some(v("2.0"))
    );
    assert_eq!(
        registry
            .get_version(&RegistryKey::current_version("foo"))
            .await
            .unwrap(),
        Some(v("2.0"))
    );
    assert!(executed_at(&registry, "foo", "initData").await.is_some());
}

#[tokio::test]
async fn test_rerun_does_not_reinvoke_once_only_component() {
    let registry = setup_registry().await;
    let journal = Journal::default();
    let catalog = ComponentCatalog::new();
    catalog
        .register(recording(&journal, "foo", "initData").applies_from(v("1.0")))
        .unwrap();
    let orchestrator = orchestrator(catalog, &registry, vec![ModuleDetails::new("foo", v("2.0"))]);

    orchestrator.run().await.unwrap();
    let first_date = executed_at(&registry, "foo", "initData").await;

    let report = orchestrator.run().await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.components_executed(), 0);
    assert_eq!(report.upgrades[0].state, ModuleState::SameVersion);
    assert!(matches!(
        report.upgrades[0].outcomes[0].1,
        ComponentOutcome::SkippedAlreadyExecuted { .. }
    ));
    assert_eq!(journal.count("foo:initData"), 1);
    assert_eq!(executed_at(&registry, "foo", "initData").await, first_date);
    assert_eq!(
        registry
            .get_version(&RegistryKey::current_version("foo"))
            .await
            .unwrap(),
        Some(v("2.0"))
    );
}

#[tokio::test]
async fn test_downgrade_fails_without_writes() {
    let registry = setup_registry().await;
    registry
        .set_value(&RegistryKey::current_version("foo"), &v("3.0").into())
        .await
        .unwrap();
    let journal = Journal::default();
    let catalog = ComponentCatalog::new();
    catalog.register(recording(&journal, "foo", "initData")).unwrap();

    let report = orchestrator(catalog, &registry, vec![ModuleDetails::new("foo", v("2.0"))])
        .run()
        .await
        .unwrap();

    assert!(!report.is_success());
    assert_eq!(report.modules_started(), 0);
    let failure = &report.failures[0];
    assert_eq!(failure.module_id, "foo");
    assert!(failure.component.is_none());
    match &failure.error {
        OrchestratorError::Downgrade {
            module_id,
            stored,
            deployed,
        } => {
            assert_eq!(module_id, "foo");
            assert_eq!(stored, &v("3.0"));
            assert_eq!(deployed, &v("2.0"));
        }
        other => panic!("unexpected error: {other}"),
    }

    assert!(journal.entries().is_empty());
    let values = registry
        .list_values(MODULES_NAMESPACE, &[PATH_MODULES, "foo"])
        .await
        .unwrap();
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].0, RegistryKey::current_version("foo"));
}

#[tokio::test]
async fn test_dependency_runs_first() {
    let registry = setup_registry().await;
    let journal = Journal::default();
    let catalog = ComponentCatalog::new();
    catalog.register(recording(&journal, "foo", "A")).unwrap();
    catalog
        .register(recording(&journal, "foo", "B").depends_on("A"))
        .unwrap();

    let report = orchestrator(catalog, &registry, vec![ModuleDetails::new("foo", v("1.0"))])
        .run()
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(journal.entries(), vec!["foo:A", "foo:B"]);
    let a = executed_at(&registry, "foo", "A").await.unwrap();
    let b = executed_at(&registry, "foo", "B").await.unwrap();
    assert!(a <= b);
}

#[tokio::test]
async fn test_dependency_reached_twice_runs_once_per_run() {
    let registry = setup_registry().await;
    let journal = Journal::default();
    let catalog = ComponentCatalog::new();
    catalog
        .register(recording(&journal, "foo", "reindex").once_only(false))
        .unwrap();
    catalog
        .register(recording(&journal, "foo", "left").depends_on("reindex"))
        .unwrap();
    catalog
        .register(recording(&journal, "foo", "right").depends_on("reindex"))
        .unwrap();
    let orchestrator = orchestrator(catalog, &registry, vec![ModuleDetails::new("foo", v("1.0"))]);

    orchestrator.run().await.unwrap();
    assert_eq!(journal.count("foo:reindex"), 1);
    assert_eq!(journal.count("foo:left"), 1);

    let report = orchestrator.run().await.unwrap();
    assert_eq!(report.components_executed(), 1);
    assert_eq!(journal.count("foo:reindex"), 2);
    assert_eq!(journal.count("foo:left"), 1);
    assert_eq!(journal.count("foo:right"), 1);
}

#[tokio::test]
async fn test_out_of_range_component_never_runs() {
    let registry = setup_registry().await;
    let journal = Journal::default();
    let catalog = ComponentCatalog::new();
    catalog
        .register(
            recording(&journal, "foo", "legacyFix")
                .applies_from(v("1.0"))
                .applies_to(v("1.5")),
        )
        .unwrap();
    catalog
        .register(recording(&journal, "foo", "future").applies_from(v("3.0")))
        .unwrap();

    let report = orchestrator(catalog, &registry, vec![ModuleDetails::new("foo", v("2.0"))])
        .run()
        .await
        .unwrap();

    assert!(report.is_success());
    assert!(journal.entries().is_empty());
    assert!(report.upgrades[0]
        .outcomes
        .iter()
        .all(|(_, outcome)| *outcome == ComponentOutcome::SkippedOutOfRange));
    assert!(executed_at(&registry, "foo", "legacyFix").await.is_none());
    assert!(executed_at(&registry, "foo", "future").await.is_none());
}

#[tokio::test]
async fn test_upgrade_runs_newly_applicable_components() {
    let registry = setup_registry().await;
    let journal = Journal::default();
    let build = |journal: &Journal| {
        let catalog = ComponentCatalog::new();
        catalog.register(recording(journal, "foo", "initData")).unwrap();
        catalog
            .register(recording(journal, "foo", "patch2").applies_from(v("2.0")))
            .unwrap();
        catalog
    };

    orchestrator(build(&journal), &registry, vec![ModuleDetails::new("foo", v("1.0"))])
        .run()
        .await
        .unwrap();
    let report = orchestrator(build(&journal), &registry, vec![ModuleDetails::new("foo", v("2.0"))])
        .run()
        .await
        .unwrap();

    assert_eq!(
        report.upgrades[0].state,
        ModuleState::Upgrading { from: v("1.0") }
    );
    assert_eq!(journal.entries(), vec!["foo:initData", "foo:patch2"]);
    assert_eq!(
        registry
            .get_version(&RegistryKey::installed_version("foo"))
            .await
            .unwrap(),
        Some(v("1.0"))
    );
    assert_eq!(
        registry
            .get_version(&RegistryKey::current_version("foo"))
            .await
            .unwrap(),
        Some(v("2.0"))
    );
}

#[tokio::test]
async fn test_failure_rolls_back_only_that_module() {
    let registry = setup_registry().await;
    let catalog = ComponentCatalog::new();
    catalog.register(ComponentDefinition::new("bar", "seed", Seed)).unwrap();
    catalog
        .register(ComponentDefinition::new("bar", "migrate", Failing).depends_on("seed"))
        .unwrap();
    catalog.register(ComponentDefinition::new("foo", "seed", Seed)).unwrap();

    let report = orchestrator(
        catalog,
        &registry,
        vec![
            ModuleDetails::new("bar", v("1.0")),
            ModuleDetails::new("foo", v("1.0")),
        ],
    )
    .run()
    .await
    .unwrap();

    assert_eq!(report.modules_found, 2);
    assert_eq!(report.modules_started(), 1);
    assert_eq!(report.components_executed(), 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].module_id, "bar");
    assert_eq!(report.failures[0].component.as_deref(), Some("migrate"));
    assert!(report.summary().ends_with(", 1 failed (bar)"));

    assert_eq!(seeded_rows(&registry).await, vec!["foo"]);
    assert!(registry
        .get_version(&RegistryKey::current_version("bar"))
        .await
        .unwrap()
        .is_none());
    assert!(executed_at(&registry, "bar", "seed").await.is_none());
    assert_eq!(
        registry
            .get_version(&RegistryKey::current_version("foo"))
            .await
            .unwrap(),
        Some(v("1.0"))
    );
}

#[tokio::test]
async fn test_downgrade_does_not_block_other_modules() {
    let registry = setup_registry().await;
    let foo_current = RegistryKey::current_version("foo");
    let foo_installed = RegistryKey::installed_version("foo");
    registry.set_value(&foo_installed, &v("1.0").into()).await.unwrap();
    registry.set_value(&foo_current, &v("3.0").into()).await.unwrap();
    let foo_before = registry
        .list_values(MODULES_NAMESPACE, &[PATH_MODULES, "foo"])
        .await
        .unwrap();

    let journal = Journal::default();
    let catalog = ComponentCatalog::new();
    catalog.register(recording(&journal, "foo", "initData")).unwrap();
    catalog.register(recording(&journal, "bar", "A")).unwrap();
    catalog
        .register(recording(&journal, "bar", "B").depends_on("A"))
        .unwrap();

    let report = orchestrator(
        catalog,
        &registry,
        vec![
            ModuleDetails::new("foo", v("2.0")),
            ModuleDetails::new("bar", v("1.0")),
        ],
    )
    .run()
    .await
    .unwrap();

    assert_eq!(report.modules_found, 2);
    assert_eq!(report.modules_started(), 1);
    assert_eq!(report.components_executed(), 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].module_id, "foo");
    assert!(matches!(
        report.failures[0].error,
        OrchestratorError::Downgrade { .. }
    ));
    assert_eq!(journal.entries(), vec!["bar:A", "bar:B"]);

    let foo_after = registry
        .list_values(MODULES_NAMESPACE, &[PATH_MODULES, "foo"])
        .await
        .unwrap();
    assert_eq!(foo_after, foo_before);
    assert!(executed_at(&registry, "foo", "initData").await.is_none());

    for key in [
        RegistryKey::installed_version("bar"),
        RegistryKey::current_version("bar"),
    ] {
        assert_eq!(registry.get_version(&key).await.unwrap(), Some(v("1.0")));
    }
    assert!(executed_at(&registry, "bar", "A").await.is_some());
    assert!(executed_at(&registry, "bar", "B").await.is_some());
}
