/// Application wiring
///
/// Opens storage, repairs degenerate stored definitions, loads the
/// registry and builds the engine with the standard executors. Used by the
/// binary; embedders with their own tools or providers can build the
/// pieces directly.

use crate::{
    config::Config,
    database,
    record::SqliteRecordStore,
    runtime::{
        engine::ScenarioEngine,
        executor::{ExecutorRegistry, LlmProvider, OpenAiCompatibleProvider, ToolRegistry},
        scheduler::ScheduleService,
    },
    scenario::{registry::ScenarioRegistry, storage::ScenarioStorage},
};
use anyhow::Result;
use std::sync::Arc;

/// Fully wired engine components
pub struct App {
    pub config: Config,
    pub registry: Arc<ScenarioRegistry>,
    pub records: SqliteRecordStore,
    pub engine: Arc<ScenarioEngine>,
}

/// Build the application from configuration
pub async fn build(config: Config) -> Result<App> {
    let pool = database::open_pool(&config.database)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open scenario database: {}", e))?;

    tracing::info!("📋 Initializing scenario storage");
    let storage = ScenarioStorage::new(pool.clone());
    storage.init_schema().await?;

    let repaired = storage.repair_empty_definitions().await?;
    if repaired > 0 {
        tracing::warn!("🩹 Repaired {} empty scenario definitions", repaired);
    }

    let records = SqliteRecordStore::new(pool);
    records.init_schema().await?;

    tracing::info!("📊 Initializing scenario registry");
    let registry = Arc::new(ScenarioRegistry::new(storage));
    registry
        .init_from_storage()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load scenarios from storage: {}", e))?;

    tracing::info!("⚙️ Initializing node executors");
    let provider: Arc<dyn LlmProvider> = Arc::new(OpenAiCompatibleProvider::new(
        "openai",
        config.engine.llm.base_url.clone(),
        config.engine.llm.api_key.clone(),
    ));
    let executors = ExecutorRegistry::standard(
        ToolRegistry::with_builtins(),
        vec![provider],
        &config.engine,
    );

    tracing::info!("🚀 Initializing scenario engine");
    let engine = Arc::new(ScenarioEngine::new(
        Arc::clone(&registry),
        executors,
        Arc::new(records.clone()),
        config.engine.clone(),
    ));

    Ok(App {
        config,
        registry,
        records,
        engine,
    })
}

/// Run schedule triggers until Ctrl-C
pub async fn serve(app: &App) -> Result<()> {
    let scheduler = ScheduleService::new(Arc::clone(&app.engine))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to initialize schedule service: {}", e))?;
    scheduler.start().await?;

    tracing::info!(
        "✅ Serving {} scenarios, press Ctrl-C to stop",
        app.registry.scenario_ids().len()
    );
    tokio::signal::ctrl_c().await?;

    scheduler.stop().await?;
    Ok(())
}
