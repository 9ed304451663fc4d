/// SQLite persistence for scenario versions
///
/// Each saved definition becomes a new immutable version row; exactly one
/// version per scenario may be flagged active. Definitions are stored as
/// JSON documents in the editor format.

use crate::scenario::types::OrchestrationDefinition;
use anyhow::Result;
use sqlx::{sqlite::SqlitePool, Row};

/// One stored version row
#[derive(Debug, Clone, PartialEq)]
pub struct StoredVersion {
    pub scenario_id: String,
    pub version: u32,
    pub definition: OrchestrationDefinition,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct ScenarioStorage {
    pool: SqlitePool,
}

impl ScenarioStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the scenario_versions table (safe to call repeatedly)
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scenario_versions (
                scenario_id TEXT NOT NULL,
                version INTEGER NOT NULL,
                definition JSON NOT NULL,
                active INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (scenario_id, version)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Store a definition as the next version of a scenario
    ///
    /// Degenerate definitions are repaired before they are persisted, so an
    /// empty `nodes` array never reaches storage.
    pub async fn save_version(
        &self,
        scenario_id: &str,
        definition: &OrchestrationDefinition,
    ) -> Result<u32> {
        let mut definition = definition.clone();
        if definition.repair() {
            tracing::warn!(
                "🩹 Repaired empty definition for scenario '{}' before saving",
                scenario_id
            );
        }
        let definition_json = serde_json::to_string(&definition)?;

        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT COALESCE(MAX(version), 0) AS latest FROM scenario_versions WHERE scenario_id = ?",
        )
        .bind(scenario_id)
        .fetch_one(&mut *tx)
        .await?;
        let latest: i64 = row.get("latest");
        let version = u32::try_from(latest + 1)
            .map_err(|_| anyhow::anyhow!("Version overflow for scenario '{}'", scenario_id))?;

        sqlx::query(
            "INSERT INTO scenario_versions (scenario_id, version, definition) VALUES (?, ?, ?)",
        )
        .bind(scenario_id)
        .bind(i64::from(version))
        .bind(&definition_json)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!("💾 Saved scenario '{}' version {}", scenario_id, version);
        Ok(version)
    }

    /// Flag one version active, clearing the flag on all others
    pub async fn set_active(&self, scenario_id: &str, version: u32) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let exists = sqlx::query(
            "SELECT 1 FROM scenario_versions WHERE scenario_id = ? AND version = ?",
        )
        .bind(scenario_id)
        .bind(i64::from(version))
        .fetch_optional(&mut *tx)
        .await?
        .is_some();

        if !exists {
            return Ok(false);
        }

        sqlx::query("UPDATE scenario_versions SET active = (version = ?) WHERE scenario_id = ?")
            .bind(i64::from(version))
            .bind(scenario_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// All versions of one scenario, oldest first
    pub async fn load_scenario(&self, scenario_id: &str) -> Result<Vec<StoredVersion>> {
        let rows = sqlx::query(
            "SELECT scenario_id, version, definition, active FROM scenario_versions
             WHERE scenario_id = ? ORDER BY version",
        )
        .bind(scenario_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(stored_version).collect()
    }

    /// Every stored version, for registry initialisation
    pub async fn load_all(&self) -> Result<Vec<StoredVersion>> {
        let rows = sqlx::query(
            "SELECT scenario_id, version, definition, active FROM scenario_versions
             ORDER BY scenario_id, version",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(stored_version).collect()
    }

    /// Delete every version of a scenario
    pub async fn delete_scenario(&self, scenario_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM scenario_versions WHERE scenario_id = ?")
            .bind(scenario_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Repair stored versions whose definition has no nodes
    ///
    /// Returns how many rows were rewritten.
    pub async fn repair_empty_definitions(&self) -> Result<usize> {
        let rows = sqlx::query("SELECT scenario_id, version, definition FROM scenario_versions")
            .fetch_all(&self.pool)
            .await?;

        let mut repaired = 0;
        for row in rows {
            let scenario_id: String = row.get("scenario_id");
            let version: i64 = row.get("version");
            let json: String = row.get("definition");

            let mut definition = match OrchestrationDefinition::from_json(&json) {
                Ok(definition) => definition,
                Err(e) => {
                    tracing::error!(
                        "❌ Unreadable definition for scenario '{}' version {}: {}",
                        scenario_id,
                        version,
                        e
                    );
                    continue;
                }
            };

            if !definition.repair() {
                continue;
            }

            sqlx::query(
                "UPDATE scenario_versions SET definition = ? WHERE scenario_id = ? AND version = ?",
            )
            .bind(serde_json::to_string(&definition)?)
            .bind(&scenario_id)
            .bind(version)
            .execute(&self.pool)
            .await?;

            tracing::warn!(
                "🩹 Repaired empty definition: scenario '{}' version {}",
                scenario_id,
                version
            );
            repaired += 1;
        }

        Ok(repaired)
    }

    #[cfg(test)]
    pub(crate) async fn insert_raw(&self, scenario_id: &str, version: u32, json: &str) -> Result<()> {
        sqlx::query("INSERT INTO scenario_versions (scenario_id, version, definition) VALUES (?, ?, ?)")
            .bind(scenario_id)
            .bind(i64::from(version))
            .bind(json)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn stored_version(row: &sqlx::sqlite::SqliteRow) -> Result<StoredVersion> {
    let scenario_id: String = row.get("scenario_id");
    let version: i64 = row.get("version");
    let json: String = row.get("definition");
    let active: i64 = row.get("active");

    let definition = OrchestrationDefinition::from_json(&json).map_err(|e| {
        anyhow::anyhow!(
            "Invalid definition for scenario '{}' version {}: {}",
            scenario_id,
            version,
            e
        )
    })?;

    Ok(StoredVersion {
        version: u32::try_from(version)
            .map_err(|_| anyhow::anyhow!("Invalid version {} for '{}'", version, scenario_id))?,
        scenario_id,
        definition,
        active: active != 0,
    })
}
