use std::sync::Arc;

use revvy_agent::{LlmError, LlmRouter, PipelineGraph};
use revvy_core::config::{AppConfig, ConfigError, LoadOptions};
use revvy_db::{
    connect_with_settings, migrations, CacheGate, DbPool, SqlOptimizationRepository,
    SqlResultCacheStore,
};
use thiserror::Error;
use tracing::info;

use crate::auth::StaticTokenVerifier;
use crate::service::OptimizeService;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub service: OptimizeService,
    pub verifier: Arc<StaticTokenVerifier>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("llm client construction failed: {0}")]
    LlmClient(#[source] LlmError),
    #[error("no api tokens configured; set auth.tokens in revvy.toml or REVVY_AUTH_TOKENS")]
    NoAuthTokens,
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    // Not enforced in config validation; the CLI runs without tokens.
    if config.auth.tokens.is_empty() {
        return Err(BootstrapError::NoAuthTokens);
    }

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let llm = LlmRouter::from_config(&config.llm).map_err(BootstrapError::LlmClient)?;
    let graph = PipelineGraph::new(llm, config.llm.models.clone());

    let cache = if config.cache.enabled {
        CacheGate::new(Arc::new(SqlResultCacheStore::new(db_pool.clone())), &config.cache)
    } else {
        CacheGate::disabled()
    };
    info!(
        event_name = "system.bootstrap.cache_configured",
        correlation_id = "bootstrap",
        enabled = cache.is_enabled(),
        ttl_secs = config.cache.ttl_secs,
        "result cache configured"
    );

    let repository = Arc::new(SqlOptimizationRepository::new(db_pool.clone()));
    let service = OptimizeService::new(graph, repository, cache);
    let verifier = Arc::new(StaticTokenVerifier::new(config.auth.tokens.clone()));

    Ok(Application { config, db_pool, service, verifier })
}
