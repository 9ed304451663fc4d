/// Per-execution state
///
/// Created when an execution starts, owned and mutated only by that
/// execution's coordinator, and summarised into the execution record once
/// the run terminates. Concurrent executions never share a context.

use crate::record::NodeStatus;
use petgraph::graph::NodeIndex;
use serde_json::{Map, Value};
use std::time::Duration;

/// Node outcome bookkeeping for one execution
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Caller-supplied input, visible to trigger nodes
    input: Value,
    /// Produced output per node index (set once the node succeeds)
    outputs: Vec<Option<Value>>,
    statuses: Vec<NodeStatus>,
    errors: Vec<Option<String>>,
    durations: Vec<Option<Duration>>,
}

impl ExecutionContext {
    /// All nodes start `Pending`
    pub fn new(input: Value, node_count: usize) -> Self {
        Self {
            input,
            outputs: vec![None; node_count],
            statuses: vec![NodeStatus::Pending; node_count],
            errors: vec![None; node_count],
            durations: vec![None; node_count],
        }
    }

    pub fn input(&self) -> &Value {
        &self.input
    }

    pub fn status(&self, index: NodeIndex) -> NodeStatus {
        self.statuses[index.index()]
    }

    pub fn output(&self, index: NodeIndex) -> Option<&Value> {
        self.outputs[index.index()].as_ref()
    }

    pub fn error(&self, index: NodeIndex) -> Option<&str> {
        self.errors[index.index()].as_deref()
    }

    pub fn duration(&self, index: NodeIndex) -> Option<Duration> {
        self.durations[index.index()]
    }

    pub fn mark_running(&mut self, index: NodeIndex) {
        self.statuses[index.index()] = NodeStatus::Running;
    }

    pub fn mark_succeeded(&mut self, index: NodeIndex, output: Value, elapsed: Duration) {
        let i = index.index();
        self.statuses[i] = NodeStatus::Succeeded;
        self.outputs[i] = Some(output);
        self.durations[i] = Some(elapsed);
    }

    pub fn mark_failed(&mut self, index: NodeIndex, error: String, elapsed: Option<Duration>) {
        let i = index.index();
        self.statuses[i] = NodeStatus::Failed;
        self.errors[i] = Some(error);
        self.durations[i] = elapsed;
    }

    pub fn mark_skipped(&mut self, index: NodeIndex, reason: Option<String>) {
        let i = index.index();
        self.statuses[i] = NodeStatus::Skipped;
        self.errors[i] = reason;
    }

    /// Nodes still `Pending`
    pub fn pending(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.statuses
            .iter()
            .enumerate()
            .filter(|(_, status)| **status == NodeStatus::Pending)
            .map(|(i, _)| NodeIndex::new(i))
    }

    /// Document the `inputs` JSONPath mappings are evaluated against
    ///
    /// `{ "input": <caller input>, "nodes": { <id>: <output> } }`
    pub fn mapping_scope<'a>(&self, ids: impl Fn(NodeIndex) -> &'a str) -> Value {
        let mut nodes = Map::new();
        for (i, output) in self.outputs.iter().enumerate() {
            if let Some(output) = output {
                nodes.insert(ids(NodeIndex::new(i)).to_string(), output.clone());
            }
        }

        let mut scope = Map::new();
        scope.insert("input".to_string(), self.input.clone());
        scope.insert("nodes".to_string(), Value::Object(nodes));
        Value::Object(scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tracks_node_lifecycle() {
        let mut ctx = ExecutionContext::new(json!({ "msg": "hi" }), 3);
        let (t, a, b) = (NodeIndex::new(0), NodeIndex::new(1), NodeIndex::new(2));

        assert_eq!(ctx.pending().count(), 3);

        ctx.mark_running(t);
        ctx.mark_succeeded(t, json!({ "msg": "hi" }), Duration::from_millis(1));
        ctx.mark_failed(a, "boom".into(), None);
        ctx.mark_skipped(b, Some("upstream failed".into()));

        assert_eq!(ctx.status(t), NodeStatus::Succeeded);
        assert_eq!(ctx.output(t), Some(&json!({ "msg": "hi" })));
        assert_eq!(ctx.status(a), NodeStatus::Failed);
        assert_eq!(ctx.error(a), Some("boom"));
        assert_eq!(ctx.status(b), NodeStatus::Skipped);
        assert_eq!(ctx.pending().count(), 0);
    }

    #[test]
    fn mapping_scope_exposes_outputs_by_id() {
        let mut ctx = ExecutionContext::new(json!(1), 2);
        ctx.mark_succeeded(NodeIndex::new(1), json!("out"), Duration::ZERO);

        let ids = ["t", "a"];
        let scope = ctx.mapping_scope(|i| ids[i.index()]);
        assert_eq!(scope, json!({ "input": 1, "nodes": { "a": "out" } }));
    }
}
