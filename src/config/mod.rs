/// Configuration for the scenario engine
///
/// Storage location, execution limits and LLM provider settings. Every
/// value has a default and can be overridden through `SCENARIO_*`
/// environment variables for container deployment.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Storage configuration
    pub database: DatabaseConfig,
    /// Execution limits and provider settings
    pub engine: EngineConfig,
}

/// SQLite storage for scenario versions and execution records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Directory holding `scenarios.db` (default: "data")
    pub data_dir: String,
}

impl DatabaseConfig {
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("scenarios.db")
    }
}

/// Runtime limits applied to every execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on the wall-clock time of one execution
    pub execution_timeout_secs: u64,
    /// Maximum nodes of one execution running at the same time
    pub max_concurrency: usize,
    /// Per-node timeout when the node has no `timeoutMs` config
    pub node_timeout_secs: u64,
    pub llm: LlmConfig,
}

impl EngineConfig {
    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_secs)
    }

    pub fn node_timeout(&self) -> Duration {
        Duration::from_secs(self.node_timeout_secs)
    }
}

/// Default OpenAI-compatible provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Model used when an llm-call node sets none
    pub model: String,
    /// Retries for transient provider failures
    pub max_retries: u32,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                data_dir: env_or("SCENARIO_DATA_DIR", "data"),
            },
            engine: EngineConfig::default(),
        }
    }
}

impl Default for EngineConfig {
    /// Defaults with ENV_VAR overrides
    fn default() -> Self {
        Self {
            execution_timeout_secs: env_parse("SCENARIO_EXECUTION_TIMEOUT_SECS", 300),
            max_concurrency: env_parse("SCENARIO_MAX_CONCURRENCY", 4usize).max(1),
            node_timeout_secs: env_parse("SCENARIO_NODE_TIMEOUT_SECS", 60),
            llm: LlmConfig::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: env_or("SCENARIO_LLM_BASE_URL", "https://api.openai.com/v1"),
            api_key: std::env::var("SCENARIO_LLM_API_KEY").ok(),
            model: env_or("SCENARIO_LLM_MODEL", "gpt-4o-mini"),
            max_retries: env_parse("SCENARIO_LLM_MAX_RETRIES", 2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_path_lives_in_data_dir() {
        let config = DatabaseConfig {
            data_dir: "/tmp/scenarios".to_string(),
        };
        assert_eq!(config.database_path(), PathBuf::from("/tmp/scenarios/scenarios.db"));
    }

    #[test]
    fn unparsable_values_fall_back() {
        assert_eq!(env_parse("SCENARIO_TEST_UNSET_VARIABLE", 7u64), 7);
    }
}
