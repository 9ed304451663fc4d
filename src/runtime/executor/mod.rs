/// Node executors
///
/// Every node kind is bound to exactly one `NodeExecutor`. Executors see
/// only what the runtime hands them in a `NodeInvocation` (resolved inputs,
/// static config, the cancellation signal) and hold no shared mutable
/// state; side effects such as tool or model calls stay inside them.

pub mod action;
pub mod condition;
pub mod llm;
pub mod tools;
pub mod trigger;

pub use action::ActionExecutor;
pub use condition::ConditionExecutor;
pub use llm::{LlmCallExecutor, LlmProvider, OpenAiCompatibleProvider};
pub use tools::{Tool, ToolRegistry};
pub use trigger::TriggerExecutor;

use crate::config::EngineConfig;
use crate::error::NodeError;
use crate::scenario::types::{NodeKind, TriggerKind};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::{collections::HashMap, fmt, sync::Arc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Everything an executor may look at for one node run
#[derive(Debug, Clone)]
pub struct NodeInvocation {
    pub execution_id: Uuid,
    pub node_id: String,
    pub kind: NodeKind,
    /// Static `data.config` of the node
    pub config: Map<String, Value>,
    /// Inputs resolved from upstream outputs (or the caller input for triggers)
    pub inputs: Value,
    /// How the execution was started
    pub trigger: TriggerKind,
    /// Cooperative cancellation for the whole execution
    pub cancel: CancellationToken,
}

impl NodeInvocation {
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }

    pub fn require_str(&self, key: &'static str) -> Result<&str, NodeError> {
        self.config_str(key).ok_or(NodeError::MissingConfig(key))
    }
}

/// Result of a successful node run
#[derive(Debug, Clone, PartialEq)]
pub struct NodeOutput {
    /// Value stored in the execution context under the node id
    pub value: Value,
    /// Branch selector, only produced by condition nodes
    pub branch: Option<String>,
}

impl NodeOutput {
    pub fn value(value: Value) -> Self {
        Self { value, branch: None }
    }

    pub fn branch(value: Value, selector: impl Into<String>) -> Self {
        Self {
            value,
            branch: Some(selector.into()),
        }
    }
}

/// Capability shared by all node kinds
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    async fn execute(&self, invocation: NodeInvocation) -> Result<NodeOutput, NodeError>;
}

/// Registration failures are raised immediately, never at dispatch time
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("cannot register executor for unknown node type '{0}'")]
    UnknownNodeType(String),

    #[error("an executor is already registered for node type '{0}'")]
    Duplicate(NodeKind),
}

/// Dispatch table from node kind to executor
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<NodeKind, Arc<dyn NodeExecutor>>,
}

impl fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&NodeKind> = self.executors.keys().collect();
        kinds.sort();
        f.debug_struct("ExecutorRegistry").field("kinds", &kinds).finish()
    }
}

impl ExecutorRegistry {
    pub fn builder() -> ExecutorRegistryBuilder {
        ExecutorRegistryBuilder::default()
    }

    /// Registry with the four built-in executors
    pub fn standard(
        tools: ToolRegistry,
        providers: Vec<Arc<dyn LlmProvider>>,
        config: &EngineConfig,
    ) -> Self {
        let mut llm = LlmCallExecutor::new(config.llm.model.clone(), config.llm.max_retries);
        for provider in providers {
            llm = llm.with_provider(provider);
        }

        let mut executors: HashMap<NodeKind, Arc<dyn NodeExecutor>> = HashMap::new();
        executors.insert(NodeKind::Trigger, Arc::new(TriggerExecutor));
        executors.insert(NodeKind::Action, Arc::new(ActionExecutor::new(tools)));
        executors.insert(NodeKind::LlmCall, Arc::new(llm));
        executors.insert(NodeKind::Condition, Arc::new(ConditionExecutor));

        Self { executors }
    }

    pub fn supports(&self, kind: NodeKind) -> bool {
        self.executors.contains_key(&kind)
    }

    pub fn get(&self, kind: NodeKind) -> Option<Arc<dyn NodeExecutor>> {
        self.executors.get(&kind).cloned()
    }

    /// Registry whose executors echo their inputs, for graph-only tests
    #[cfg(test)]
    pub(crate) fn noop() -> Self {
        struct Noop;

        #[async_trait]
        impl NodeExecutor for Noop {
            async fn execute(&self, invocation: NodeInvocation) -> Result<NodeOutput, NodeError> {
                Ok(NodeOutput::value(invocation.inputs))
            }
        }

        let noop: Arc<dyn NodeExecutor> = Arc::new(Noop);
        Self {
            executors: NodeKind::ALL.into_iter().map(|k| (k, noop.clone())).collect(),
        }
    }
}

/// Builds a registry, rejecting unknown tags and double registration
#[derive(Default)]
pub struct ExecutorRegistryBuilder {
    executors: HashMap<NodeKind, Arc<dyn NodeExecutor>>,
}

impl ExecutorRegistryBuilder {
    pub fn register(
        mut self,
        kind: NodeKind,
        executor: Arc<dyn NodeExecutor>,
    ) -> Result<Self, RegistrationError> {
        if self.executors.contains_key(&kind) {
            return Err(RegistrationError::Duplicate(kind));
        }
        self.executors.insert(kind, executor);
        Ok(self)
    }

    /// Register by the type string used in definitions
    pub fn register_type(
        self,
        node_type: &str,
        executor: Arc<dyn NodeExecutor>,
    ) -> Result<Self, RegistrationError> {
        let kind: NodeKind = node_type
            .parse()
            .map_err(RegistrationError::UnknownNodeType)?;
        self.register(kind, executor)
    }

    pub fn build(self) -> ExecutorRegistry {
        ExecutorRegistry {
            executors: self.executors,
        }
    }
}
