/// Trigger node: entry point of a scenario

use super::{NodeExecutor, NodeInvocation, NodeOutput};
use crate::error::NodeError;
use async_trait::async_trait;

/// Passes the caller input through after checking the trigger fires for this invocation
#[derive(Debug, Default, Clone, Copy)]
pub struct TriggerExecutor;

#[async_trait]
impl NodeExecutor for TriggerExecutor {
    async fn execute(&self, invocation: NodeInvocation) -> Result<NodeOutput, NodeError> {
        let configured = invocation.config_str("triggerType").unwrap_or("manual");

        if !invocation.trigger.fires(configured) {
            tracing::warn!(
                "🚫 Trigger '{}' ({}) does not fire for a {} invocation",
                invocation.node_id,
                configured,
                invocation.trigger
            );
            return Err(NodeError::TriggerMismatch {
                configured: configured.to_string(),
                invoked: invocation.trigger.to_string(),
            });
        }

        Ok(NodeOutput::value(invocation.inputs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::types::{NodeKind, TriggerKind};
    use serde_json::{json, Map, Value};
    use tokio_util::sync::CancellationToken;

    fn invocation(trigger_type: &str, trigger: TriggerKind) -> NodeInvocation {
        let mut config = Map::new();
        config.insert("triggerType".into(), Value::String(trigger_type.into()));
        NodeInvocation {
            execution_id: uuid::Uuid::new_v4(),
            node_id: "t".into(),
            kind: NodeKind::Trigger,
            config,
            inputs: json!({ "msg": "hi" }),
            trigger,
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn passes_input_through() {
        let output = TriggerExecutor
            .execute(invocation("webhook", TriggerKind::Webhook))
            .await
            .unwrap();
        assert_eq!(output.value, json!({ "msg": "hi" }));
        assert_eq!(output.branch, None);
    }

    #[tokio::test]
    async fn rejects_mismatched_invocation() {
        let err = TriggerExecutor
            .execute(invocation("schedule", TriggerKind::Webhook))
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::TriggerMismatch { .. }));
    }

    #[tokio::test]
    async fn test_runs_fire_any_trigger() {
        assert!(TriggerExecutor
            .execute(invocation("schedule", TriggerKind::Test))
            .await
            .is_ok());
    }
}
