/// Action node: call an external tool

use super::{NodeExecutor, NodeInvocation, NodeOutput, ToolRegistry};
use crate::error::NodeError;
use crate::runtime::template;
use async_trait::async_trait;

/// Invokes the tool named by `config.tool`
///
/// Params come from `config.params` rendered against the resolved inputs;
/// without `params` the resolved inputs are passed as-is.
#[derive(Debug, Clone)]
pub struct ActionExecutor {
    tools: ToolRegistry,
}

impl ActionExecutor {
    pub fn new(tools: ToolRegistry) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl NodeExecutor for ActionExecutor {
    async fn execute(&self, invocation: NodeInvocation) -> Result<NodeOutput, NodeError> {
        let tool_name = invocation.require_str("tool")?;
        let tool = self
            .tools
            .get(tool_name)
            .ok_or_else(|| NodeError::UnknownTool(tool_name.to_string()))?;

        let params = match invocation.config.get("params") {
            Some(params) => template::render_value(params, &invocation.inputs)
                .map_err(NodeError::InvalidConfig)?,
            None => invocation.inputs.clone(),
        };

        tracing::debug!("🔧 Node '{}' invoking tool '{}'", invocation.node_id, tool_name);

        let result = tool
            .invoke(params, &invocation.cancel)
            .await
            .map_err(|message| NodeError::Tool {
                tool: tool_name.to_string(),
                message,
            })?;

        Ok(NodeOutput::value(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::executor::tools::EchoTool;
    use crate::scenario::types::{NodeKind, TriggerKind};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn invocation(config: Value, inputs: Value) -> NodeInvocation {
        NodeInvocation {
            execution_id: uuid::Uuid::new_v4(),
            node_id: "a".into(),
            kind: NodeKind::Action,
            config: config.as_object().cloned().unwrap_or_default(),
            inputs,
            trigger: TriggerKind::Manual,
            cancel: CancellationToken::new(),
        }
    }

    fn executor() -> ActionExecutor {
        ActionExecutor::new(ToolRegistry::new().with_tool("echo", Arc::new(EchoTool)))
    }

    #[tokio::test]
    async fn inputs_are_default_params() {
        let output = executor()
            .execute(invocation(json!({ "tool": "echo" }), json!({ "msg": "hi" })))
            .await
            .unwrap();
        assert_eq!(output.value, json!({ "msg": "hi" }));
    }

    #[tokio::test]
    async fn params_are_rendered_from_inputs() {
        let output = executor()
            .execute(invocation(
                json!({ "tool": "echo", "params": { "text": "{{ input.msg }} there" } }),
                json!({ "msg": "hi" }),
            ))
            .await
            .unwrap();
        assert_eq!(output.value, json!({ "text": "hi there" }));
    }

    #[tokio::test]
    async fn unknown_tool_fails() {
        let err = executor()
            .execute(invocation(json!({ "tool": "teleport" }), Value::Null))
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::UnknownTool(name) if name == "teleport"));
    }

    #[tokio::test]
    async fn missing_tool_fails() {
        let err = executor()
            .execute(invocation(json!({}), Value::Null))
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::MissingConfig("tool")));
    }
}
