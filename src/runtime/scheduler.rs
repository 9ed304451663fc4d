/// Cron scheduler for `schedule` triggers
///
/// Registers one tokio-cron-scheduler job per trigger node with
/// `triggerType: "schedule"` in each active scenario version. A job runs the
/// scenario's *current* active version as a schedule invocation, so
/// activating a new version takes effect on the next tick; `sync_scenario`
/// is only needed when the set of schedules changes.

use crate::runtime::engine::{ExecutionRequest, ScenarioEngine};
use crate::scenario::registry::DefinitionRef;
use crate::scenario::types::{NodeKind, OrchestrationDefinition, TriggerKind};
use anyhow::Result;
use serde_json::{json, Value};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

/// Recorded as `triggered_by` for scheduled executions
pub const SCHEDULER_PRINCIPAL: &str = "scheduler";

pub struct ScheduleService {
    scheduler: Arc<RwLock<JobScheduler>>,
    /// Key: "{scenario_id}:{node_id}"
    job_uuid_map: Arc<RwLock<HashMap<String, Uuid>>>,
    engine: Arc<ScenarioEngine>,
}

impl ScheduleService {
    pub async fn new(engine: Arc<ScenarioEngine>) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler: Arc::new(RwLock::new(scheduler)),
            job_uuid_map: Arc::new(RwLock::new(HashMap::new())),
            engine,
        })
    }

    /// Register every active scenario's schedules and start ticking
    pub async fn start(&self) -> Result<()> {
        tracing::info!("⏰ Starting schedule service");

        let mut total = 0;
        for resolved in self.engine.registry().active_definitions() {
            match self
                .sync_definition(&resolved.scenario_id, &resolved.definition)
                .await
            {
                Ok(count) => total += count,
                Err(e) => tracing::error!(
                    "❌ Failed to register schedules for scenario '{}': {}",
                    resolved.scenario_id,
                    e
                ),
            }
        }

        {
            let scheduler = self.scheduler.read().await;
            scheduler.start().await?;
        }

        tracing::info!("✅ Schedule service started with {} jobs", total);
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        tracing::info!("⏹️ Stopping schedule service");

        self.job_uuid_map.write().await.clear();
        {
            let mut scheduler = self.scheduler.write().await;
            scheduler.shutdown().await?;
        }

        tracing::info!("✅ Schedule service stopped");
        Ok(())
    }

    /// Replace a scenario's jobs with those of its active version
    ///
    /// Returns the number of jobs now registered for the scenario.
    pub async fn sync_scenario(&self, scenario_id: &str) -> Result<usize> {
        match self.engine.registry().resolve(&DefinitionRef::active(scenario_id)) {
            Ok(resolved) => self.sync_definition(scenario_id, &resolved.definition).await,
            Err(_) => {
                self.remove_scenario(scenario_id).await;
                Ok(0)
            }
        }
    }

    /// Drop every job of a scenario
    pub async fn remove_scenario(&self, scenario_id: &str) {
        let prefix = format!("{}:", scenario_id);
        let mut job_uuid_map = self.job_uuid_map.write().await;
        let keys: Vec<String> = job_uuid_map
            .keys()
            .filter(|key| key.starts_with(&prefix))
            .cloned()
            .collect();

        for key in keys {
            if let Some(job_uuid) = job_uuid_map.remove(&key) {
                let scheduler = self.scheduler.read().await;
                if let Err(e) = scheduler.remove(&job_uuid).await {
                    tracing::warn!("⚠️ Failed to remove job {} from scheduler: {}", key, e);
                } else {
                    tracing::debug!("🛑 Removed schedule job: {}", key);
                }
            }
        }
    }

    /// Number of registered jobs for a scenario
    pub async fn job_count(&self, scenario_id: &str) -> usize {
        let prefix = format!("{}:", scenario_id);
        self.job_uuid_map
            .read()
            .await
            .keys()
            .filter(|key| key.starts_with(&prefix))
            .count()
    }

    async fn sync_definition(
        &self,
        scenario_id: &str,
        definition: &OrchestrationDefinition,
    ) -> Result<usize> {
        self.remove_scenario(scenario_id).await;

        let schedules = scheduled_triggers(definition)?;
        for (node_id, schedule) in &schedules {
            self.add_job(scenario_id, node_id, schedule).await?;
        }

        if !schedules.is_empty() {
            tracing::info!(
                "🔥 Registered {} schedule triggers for scenario '{}'",
                schedules.len(),
                scenario_id
            );
        }
        Ok(schedules.len())
    }

    async fn add_job(&self, scenario_id: &str, node_id: &str, schedule: &str) -> Result<()> {
        let job_id = format!("{}:{}", scenario_id, node_id);
        let scenario_id = scenario_id.to_string();
        let engine = Arc::clone(&self.engine);

        let job = Job::new_async(schedule, move |_uuid, _l| {
            let scenario_id = scenario_id.clone();
            let engine = Arc::clone(&engine);

            Box::pin(async move {
                tracing::debug!("🔔 Schedule fired for scenario '{}'", scenario_id);

                let request = ExecutionRequest {
                    definition: DefinitionRef::active(scenario_id.clone()),
                    input: json!({}),
                    triggered_by: SCHEDULER_PRINCIPAL.to_string(),
                    trigger: TriggerKind::Schedule,
                };

                match engine.execute(request).await {
                    Ok(record) => tracing::info!(
                        "✅ Scheduled execution of '{}' finished: {}",
                        scenario_id,
                        record.status.as_str()
                    ),
                    Err(e) => tracing::error!(
                        "❌ Scheduled execution of '{}' failed: {}",
                        scenario_id,
                        e
                    ),
                }
            })
        })
        .map_err(|e| anyhow::anyhow!("Invalid schedule '{}' on {}: {}", schedule, job_id, e))?;

        let job_uuid = {
            let scheduler = self.scheduler.write().await;
            scheduler.add(job).await?
        };

        self.job_uuid_map.write().await.insert(job_id.clone(), job_uuid);
        tracing::debug!("📝 Registered schedule job {} ({})", job_id, schedule);
        Ok(())
    }
}

/// `(node_id, cron expression)` for every schedule trigger
fn scheduled_triggers(definition: &OrchestrationDefinition) -> Result<Vec<(String, String)>> {
    definition
        .nodes
        .iter()
        .filter(|node| node.kind() == Some(NodeKind::Trigger) && node.trigger_type() == "schedule")
        .map(|node| {
            node.config("schedule")
                .and_then(Value::as_str)
                .map(|schedule| (node.id.clone(), schedule.to_string()))
                .ok_or_else(|| {
                    anyhow::anyhow!("Schedule trigger '{}' missing 'schedule' config", node.id)
                })
        })
        .collect()
}
