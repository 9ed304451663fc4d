/// Hot-reload scenario registry using ArcSwap
///
/// Holds every stored version of every scenario in memory. Updates swap
/// the whole map atomically, so executions already holding a definition
/// keep running against the snapshot they resolved.

use crate::error::EngineError;
use crate::scenario::storage::ScenarioStorage;
use crate::scenario::types::OrchestrationDefinition;
use anyhow::Result;
use arc_swap::ArcSwap;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Which version of a scenario to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSelector {
    /// The version flagged active for production
    Active,
    /// A specific version, e.g. a draft under test
    Pinned(u32),
}

impl fmt::Display for VersionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSelector::Active => f.write_str("active"),
            VersionSelector::Pinned(version) => write!(f, "{}", version),
        }
    }
}

/// Reference to a definition as passed by callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionRef {
    pub scenario_id: String,
    pub version: VersionSelector,
}

impl DefinitionRef {
    pub fn active(scenario_id: impl Into<String>) -> Self {
        Self {
            scenario_id: scenario_id.into(),
            version: VersionSelector::Active,
        }
    }

    pub fn pinned(scenario_id: impl Into<String>, version: u32) -> Self {
        Self {
            scenario_id: scenario_id.into(),
            version: VersionSelector::Pinned(version),
        }
    }
}

/// All versions of one scenario
#[derive(Debug, Clone, Default)]
pub struct ScenarioVersions {
    pub versions: BTreeMap<u32, Arc<OrchestrationDefinition>>,
    pub active: Option<u32>,
}

/// A definition resolved from a `DefinitionRef`
#[derive(Debug, Clone)]
pub struct ResolvedDefinition {
    pub scenario_id: String,
    pub version: u32,
    pub definition: Arc<OrchestrationDefinition>,
}

#[derive(Debug)]
pub struct ScenarioRegistry {
    /// Key: scenario_id
    scenarios: ArcSwap<HashMap<String, ScenarioVersions>>,
    storage: ScenarioStorage,
}

impl ScenarioRegistry {
    pub fn new(storage: ScenarioStorage) -> Self {
        Self {
            scenarios: ArcSwap::new(Arc::new(HashMap::new())),
            storage,
        }
    }

    /// Load every stored version into memory
    pub async fn init_from_storage(&self) -> Result<()> {
        let mut scenarios: HashMap<String, ScenarioVersions> = HashMap::new();

        for stored in self.storage.load_all().await? {
            let entry = scenarios.entry(stored.scenario_id).or_default();
            if stored.active {
                entry.active = Some(stored.version);
            }
            entry
                .versions
                .insert(stored.version, Arc::new(stored.definition));
        }

        let count = scenarios.len();
        self.scenarios.store(Arc::new(scenarios));

        tracing::info!("📚 Initialized scenario registry with {} scenarios", count);
        Ok(())
    }

    /// Store a new version and hot-reload it, optionally making it active
    pub async fn publish(
        &self,
        scenario_id: &str,
        definition: &OrchestrationDefinition,
        activate: bool,
    ) -> Result<u32> {
        let version = self.storage.save_version(scenario_id, definition).await?;
        if activate {
            self.storage.set_active(scenario_id, version).await?;
        }
        self.reload_scenario(scenario_id).await?;

        tracing::info!(
            "📦 Published scenario '{}' version {}{}",
            scenario_id,
            version,
            if activate { " (active)" } else { "" }
        );
        Ok(version)
    }

    /// Make a stored version the active one
    pub async fn activate(&self, scenario_id: &str, version: u32) -> Result<()> {
        if !self.storage.set_active(scenario_id, version).await? {
            return Err(anyhow::anyhow!(
                "Scenario '{}' has no version {}",
                scenario_id,
                version
            ));
        }
        self.reload_scenario(scenario_id).await?;

        tracing::info!("🔁 Activated scenario '{}' version {}", scenario_id, version);
        Ok(())
    }

    /// Re-read one scenario from storage and swap it in
    pub async fn reload_scenario(&self, scenario_id: &str) -> Result<()> {
        let stored = self.storage.load_scenario(scenario_id).await?;

        let mut entry = ScenarioVersions::default();
        for version in stored {
            if version.active {
                entry.active = Some(version.version);
            }
            entry
                .versions
                .insert(version.version, Arc::new(version.definition));
        }

        let current = self.scenarios.load();
        let mut scenarios = (**current).clone();
        if entry.versions.is_empty() {
            scenarios.remove(scenario_id);
        } else {
            scenarios.insert(scenario_id.to_string(), entry);
        }
        self.scenarios.store(Arc::new(scenarios));

        tracing::debug!("🔥 Hot-reloaded scenario '{}'", scenario_id);
        Ok(())
    }

    /// Delete a scenario from storage and memory
    pub async fn remove(&self, scenario_id: &str) -> Result<bool> {
        let deleted = self.storage.delete_scenario(scenario_id).await?;

        let current = self.scenarios.load();
        let mut scenarios = (**current).clone();
        if scenarios.remove(scenario_id).is_some() {
            self.scenarios.store(Arc::new(scenarios));
            tracing::info!("🗑️ Removed scenario '{}' from registry", scenario_id);
        }

        Ok(deleted)
    }

    /// Resolve a reference to a concrete version (lock-free read)
    pub fn resolve(&self, reference: &DefinitionRef) -> Result<ResolvedDefinition, EngineError> {
        let scenarios = self.scenarios.load();
        let entry = scenarios
            .get(&reference.scenario_id)
            .ok_or_else(|| EngineError::DefinitionNotFound(reference.scenario_id.clone()))?;

        let version = match reference.version {
            VersionSelector::Pinned(version) => version,
            VersionSelector::Active => entry.active.ok_or_else(|| EngineError::VersionNotFound {
                scenario_id: reference.scenario_id.clone(),
                version: reference.version.to_string(),
            })?,
        };

        let definition = entry
            .versions
            .get(&version)
            .cloned()
            .ok_or_else(|| EngineError::VersionNotFound {
                scenario_id: reference.scenario_id.clone(),
                version: version.to_string(),
            })?;

        Ok(ResolvedDefinition {
            scenario_id: reference.scenario_id.clone(),
            version,
            definition,
        })
    }

    /// Active definition of every scenario that has one (used by the scheduler)
    pub fn active_definitions(&self) -> Vec<ResolvedDefinition> {
        let scenarios = self.scenarios.load();
        let mut active: Vec<ResolvedDefinition> = scenarios
            .iter()
            .filter_map(|(scenario_id, entry)| {
                let version = entry.active?;
                let definition = entry.versions.get(&version)?.clone();
                Some(ResolvedDefinition {
                    scenario_id: scenario_id.clone(),
                    version,
                    definition,
                })
            })
            .collect();
        active.sort_by(|a, b| a.scenario_id.cmp(&b.scenario_id));
        active
    }

    pub fn scenario_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.scenarios.load().keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory_pool;
    use serde_json::json;

    async fn registry() -> ScenarioRegistry {
        let storage = ScenarioStorage::new(memory_pool().await.unwrap());
        storage.init_schema().await.unwrap();
        ScenarioRegistry::new(storage)
    }

    fn definition(tool: &str) -> OrchestrationDefinition {
        serde_json::from_value(json!({
            "nodes": [
                { "id": "t", "type": "trigger" },
                { "id": "a", "type": "action", "data": { "config": { "tool": tool } } }
            ],
            "edges": [{ "from": "t", "to": "a" }]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn active_and_pinned_versions_resolve() {
        let registry = registry().await;
        registry.publish("welcome", &definition("echo"), true).await.unwrap();
        let draft = registry.publish("welcome", &definition("http"), false).await.unwrap();

        let active = registry.resolve(&DefinitionRef::active("welcome")).unwrap();
        assert_eq!(active.version, 1);
        assert_eq!(active.definition.nodes[1].config_str("tool"), Some("echo"));

        let pinned = registry.resolve(&DefinitionRef::pinned("welcome", draft)).unwrap();
        assert_eq!(pinned.version, 2);
        assert_eq!(pinned.definition.nodes[1].config_str("tool"), Some("http"));

        registry.activate("welcome", draft).await.unwrap();
        assert_eq!(registry.resolve(&DefinitionRef::active("welcome")).unwrap().version, 2);
    }

    #[tokio::test]
    async fn missing_scenarios_and_versions_are_errors() {
        let registry = registry().await;
        assert!(matches!(
            registry.resolve(&DefinitionRef::active("nope")),
            Err(EngineError::DefinitionNotFound(_))
        ));

        registry.publish("draft-only", &definition("echo"), false).await.unwrap();
        assert!(matches!(
            registry.resolve(&DefinitionRef::active("draft-only")),
            Err(EngineError::VersionNotFound { .. })
        ));
        assert!(matches!(
            registry.resolve(&DefinitionRef::pinned("draft-only", 7)),
            Err(EngineError::VersionNotFound { .. })
        ));
        assert!(registry.activate("draft-only", 7).await.is_err());
    }

    #[tokio::test]
    async fn init_from_storage_restores_state() {
        let storage = ScenarioStorage::new(memory_pool().await.unwrap());
        storage.init_schema().await.unwrap();
        storage.save_version("a", &definition("echo")).await.unwrap();
        storage.set_active("a", 1).await.unwrap();
        storage.save_version("b", &definition("echo")).await.unwrap();

        let registry = ScenarioRegistry::new(storage);
        registry.init_from_storage().await.unwrap();

        assert_eq!(registry.scenario_ids(), vec!["a".to_string(), "b".to_string()]);
        let active = registry.active_definitions();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].scenario_id, "a");
    }

    #[tokio::test]
    async fn remove_drops_scenario() {
        let registry = registry().await;
        registry.publish("gone", &definition("echo"), true).await.unwrap();

        assert!(registry.remove("gone").await.unwrap());
        assert!(registry.resolve(&DefinitionRef::active("gone")).is_err());
        assert!(registry.scenario_ids().is_empty());
    }
}
