#![allow(dead_code)]

use async_trait::async_trait;
use scenario_engine::config::{EngineConfig, LlmConfig};
use scenario_engine::database::memory_pool;
use scenario_engine::record::{MemoryRecordSink, RecordSink};
use scenario_engine::runtime::executor::llm::{CompletionRequest, ProviderError};
use scenario_engine::runtime::executor::{ExecutorRegistry, LlmProvider, Tool, ToolRegistry};
use scenario_engine::scenario::{OrchestrationDefinition, ScenarioRegistry, ScenarioStorage};
use scenario_engine::ScenarioEngine;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;
use tokio_util::sync::CancellationToken;

/// Always fails with `params.message` (default "boom")
pub struct FailTool;

#[async_trait]
impl Tool for FailTool {
    async fn invoke(&self, params: Value, _cancel: &CancellationToken) -> Result<Value, String> {
        Err(params
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("boom")
            .to_string())
    }
}

/// Sleeps `params.ms` milliseconds unless cancelled, then echoes params
pub struct SleepTool;

#[async_trait]
impl Tool for SleepTool {
    async fn invoke(&self, params: Value, cancel: &CancellationToken) -> Result<Value, String> {
        let ms = params.get("ms").and_then(Value::as_u64).unwrap_or(0);
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(ms)) => Ok(params),
            _ = cancel.cancelled() => Err("cancelled".to_string()),
        }
    }
}

/// Waits until `n` invocations are in flight at once
pub struct BarrierTool(pub Arc<Barrier>);

#[async_trait]
impl Tool for BarrierTool {
    async fn invoke(&self, params: Value, _cancel: &CancellationToken) -> Result<Value, String> {
        self.0.wait().await;
        Ok(params)
    }
}

/// Answers every prompt with "stub: <prompt>"
pub struct StubProvider;

#[async_trait]
impl LlmProvider for StubProvider {
    fn name(&self) -> &str {
        "stub"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        Ok(format!("stub: {}", request.prompt))
    }
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        execution_timeout_secs: 10,
        max_concurrency: 4,
        node_timeout_secs: 5,
        llm: LlmConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            api_key: None,
            model: "stub-model".to_string(),
            max_retries: 0,
        },
    }
}

pub fn test_tools() -> ToolRegistry {
    ToolRegistry::with_builtins()
        .with_tool("fail", Arc::new(FailTool))
        .with_tool("sleep", Arc::new(SleepTool))
}

pub fn definition(doc: Value) -> OrchestrationDefinition {
    serde_json::from_value(doc).expect("test definition parses")
}

pub struct Harness {
    pub engine: Arc<ScenarioEngine>,
    pub registry: Arc<ScenarioRegistry>,
    pub sink: Arc<MemoryRecordSink>,
}

pub async fn harness() -> Harness {
    harness_with(test_config(), test_tools()).await
}

pub async fn harness_with(config: EngineConfig, tools: ToolRegistry) -> Harness {
    let storage = ScenarioStorage::new(memory_pool().await.expect("memory pool"));
    storage.init_schema().await.expect("schema");
    let registry = Arc::new(ScenarioRegistry::new(storage));
    let sink = Arc::new(MemoryRecordSink::new());

    let providers: Vec<Arc<dyn LlmProvider>> = vec![Arc::new(StubProvider)];
    let executors = ExecutorRegistry::standard(tools, providers, &config);
    let record_sink: Arc<dyn RecordSink> = sink.clone();
    let engine = Arc::new(ScenarioEngine::new(
        Arc::clone(&registry),
        executors,
        record_sink,
        config,
    ));

    Harness {
        engine,
        registry,
        sink,
    }
}

impl Harness {
    /// Publish as the active version of `scenario_id`
    pub async fn publish(&self, scenario_id: &str, doc: Value) -> u32 {
        self.registry
            .publish(scenario_id, &definition(doc), true)
            .await
            .expect("publish")
    }
}
