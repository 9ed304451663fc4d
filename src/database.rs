/// SQLite connection pools
///
/// One database file (`{data_dir}/scenarios.db`) holds scenario versions
/// and execution records. Tests use a single-connection in-memory pool.

use crate::config::DatabaseConfig;
use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

/// Open (creating if missing) the engine database
pub async fn open_pool(config: &DatabaseConfig) -> Result<SqlitePool> {
    std::fs::create_dir_all(&config.data_dir).map_err(|e| {
        anyhow::anyhow!("Failed to create data directory '{}': {}", config.data_dir, e)
    })?;
    let db_path = config.database_path();

    tracing::info!("🗄️ Opening scenario database: {}", db_path.display());

    let options = SqliteConnectOptions::new()
        .filename(&db_path)
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(options).await?;

    Ok(pool)
}

/// Private in-memory database
///
/// Limited to one connection, since every SQLite memory connection is its own database.
pub async fn memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    Ok(pool)
}
