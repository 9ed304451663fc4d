/// SQLite execution record store
///
/// Records are appended to the `executions` table as JSON alongside the
/// indexed lookup columns. Rows are never updated.

use super::{ExecutionRecord, RecordSink};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::{sqlite::SqlitePool, Row};

#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the executions table (safe to call repeatedly)
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS executions (
                execution_id TEXT PRIMARY KEY,
                scenario_id TEXT NOT NULL,
                version INTEGER,
                status TEXT NOT NULL,
                record JSON NOT NULL,
                started_at TEXT NOT NULL,
                finished_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_executions_scenario
            ON executions(scenario_id, started_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetch a record by execution id (operator tooling, not used by the engine)
    pub async fn get(&self, execution_id: &str) -> Result<Option<ExecutionRecord>> {
        let row = sqlx::query("SELECT record FROM executions WHERE execution_id = ?")
            .bind(execution_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let json: String = row.get("record");
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => Ok(None),
        }
    }

    pub async fn count_for_scenario(&self, scenario_id: &str) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM executions WHERE scenario_id = ?")
            .bind(scenario_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }
}

#[async_trait]
impl RecordSink for SqliteRecordStore {
    async fn write(&self, record: &ExecutionRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;

        sqlx::query(
            r#"
            INSERT INTO executions
                (execution_id, scenario_id, version, status, record, started_at, finished_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.execution_id.to_string())
        .bind(&record.scenario_id)
        .bind(record.version.map(i64::from))
        .bind(record.status.as_str())
        .bind(&json)
        .bind(record.started_at.to_rfc3339())
        .bind(record.finished_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to write execution record {}: {}", record.execution_id, e))?;

        tracing::debug!("💾 Stored execution record {}", record.execution_id);
        Ok(())
    }
}
