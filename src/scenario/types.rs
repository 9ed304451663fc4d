/// Core scenario definition types
///
/// A scenario version is persisted as a JSON document of `nodes` and `edges`
/// produced by the visual editor. These types mirror that document; the node
/// `type` is kept as a raw string so an unrecognised type surfaces as a
/// validation error instead of a parse failure.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// One scenario/workflow version: the authored graph
///
/// `nodes` keeps authoring order, which the planner uses to break ties
/// between nodes with no dependency relation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationDefinition {
    /// Nodes in authoring order (a missing array parses as empty)
    #[serde(default)]
    pub nodes: Vec<Node>,
    /// Directed connections between nodes
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// A single node of the authored graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique node identifier within the definition (e.g. "t", "fetch-user")
    pub id: String,
    /// Raw type discriminator as written by the editor ("trigger", "action", ...)
    #[serde(rename = "type")]
    pub node_type: String,
    /// Canvas position, carried through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    /// Display label and type-specific configuration
    #[serde(default)]
    pub data: NodeData,
}

/// Editor canvas coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Node payload: label is display-only, config drives execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Type-specific configuration map
    ///
    /// - trigger: `{ "triggerType": "manual" | "schedule" | "webhook", "schedule": "<cron>" }`
    /// - action: `{ "tool": "echo", "params": { ... } }`
    /// - llm-call: `{ "provider": "openai", "model": "...", "prompt": "..." }`
    /// - condition: `{ "expression": "input.score > 70" }`
    ///
    /// Every type also accepts `inputs` (name -> JSONPath) and `timeoutMs`.
    #[serde(default)]
    pub config: Map<String, Value>,
}

/// Connection between two nodes
///
/// `condition` labels a branch out of a condition node; it is ignored on
/// edges leaving any other kind of node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    #[serde(alias = "source")]
    pub from: String,
    #[serde(alias = "target")]
    pub to: String,
    #[serde(default, alias = "branch", skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// The closed set of node kinds the engine knows how to execute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    /// Entry point; passes the caller input through
    Trigger,
    /// External tool call
    Action,
    /// Model provider call
    LlmCall,
    /// Predicate selecting which outgoing edges are live
    Condition,
}

impl NodeKind {
    pub const ALL: [NodeKind; 4] = [
        NodeKind::Trigger,
        NodeKind::Action,
        NodeKind::LlmCall,
        NodeKind::Condition,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Trigger => "trigger",
            NodeKind::Action => "action",
            NodeKind::LlmCall => "llm-call",
            NodeKind::Condition => "condition",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// How an execution was started
///
/// A trigger node's `triggerType` must match the invocation kind; `Test`
/// (the editor's test-run action) matches every trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Manual,
    Schedule,
    Webhook,
    Test,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Manual => "manual",
            TriggerKind::Schedule => "schedule",
            TriggerKind::Webhook => "webhook",
            TriggerKind::Test => "test",
        }
    }

    /// Whether a trigger node configured with `trigger_type` fires for this invocation
    pub fn fires(&self, trigger_type: &str) -> bool {
        matches!(self, TriggerKind::Test) || self.as_str() == trigger_type
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Node {
    /// Parsed kind, or `None` when the type string is not recognised
    pub fn kind(&self) -> Option<NodeKind> {
        self.node_type.parse().ok()
    }

    pub fn config(&self, key: &str) -> Option<&Value> {
        self.data.config.get(key)
    }

    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config(key).and_then(Value::as_str)
    }

    /// `triggerType` of a trigger node, defaulting to manual
    pub fn trigger_type(&self) -> &str {
        self.config_str("triggerType").unwrap_or("manual")
    }
}

impl OrchestrationDefinition {
    /// Parse a persisted definition document
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Repair a degenerate definition by synthesising a single manual trigger
    ///
    /// Returns `true` when the definition was changed. Definitions that
    /// already have nodes are left alone.
    pub fn repair(&mut self) -> bool {
        if !self.nodes.is_empty() {
            return false;
        }

        let mut config = Map::new();
        config.insert("triggerType".to_string(), Value::String("manual".to_string()));

        self.nodes.push(Node {
            id: "trigger".to_string(),
            node_type: NodeKind::Trigger.as_str().to_string(),
            position: Some(Position { x: 0.0, y: 0.0 }),
            data: NodeData {
                label: Some("Trigger".to_string()),
                config,
            },
        });
        self.edges.clear();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_editor_document() {
        let doc = json!({
            "nodes": [
                { "id": "t", "type": "trigger", "position": { "x": 1.0, "y": 2.0 },
                  "data": { "label": "Start", "config": { "triggerType": "webhook" } } },
                { "id": "a", "type": "action", "data": { "config": { "tool": "echo" } } }
            ],
            "edges": [ { "source": "t", "target": "a", "branch": "yes" } ]
        });

        let def: OrchestrationDefinition = serde_json::from_value(doc).unwrap();
        assert_eq!(def.nodes.len(), 2);
        assert_eq!(def.nodes[0].kind(), Some(NodeKind::Trigger));
        assert_eq!(def.nodes[0].trigger_type(), "webhook");
        assert_eq!(def.nodes[1].config_str("tool"), Some("echo"));
        assert_eq!(def.edges[0].from, "t");
        assert_eq!(def.edges[0].condition.as_deref(), Some("yes"));
    }

    #[test]
    fn missing_nodes_parse_as_empty() {
        let def = OrchestrationDefinition::from_json("{}").unwrap();
        assert!(def.nodes.is_empty());
        assert!(def.edges.is_empty());
    }

    #[test]
    fn unknown_type_is_kept_raw() {
        let def = OrchestrationDefinition::from_json(
            r#"{"nodes":[{"id":"x","type":"teleport"}],"edges":[]}"#,
        )
        .unwrap();
        assert_eq!(def.nodes[0].node_type, "teleport");
        assert_eq!(def.nodes[0].kind(), None);
    }

    #[test]
    fn repair_synthesises_single_trigger() {
        let mut def = OrchestrationDefinition {
            nodes: vec![],
            edges: vec![Edge { from: "a".into(), to: "b".into(), condition: None }],
        };

        assert!(def.repair());
        assert_eq!(def.nodes.len(), 1);
        assert_eq!(def.nodes[0].kind(), Some(NodeKind::Trigger));
        assert!(def.edges.is_empty());
        assert!(!def.repair());
    }

    #[test]
    fn test_invocations_fire_every_trigger() {
        assert!(TriggerKind::Test.fires("webhook"));
        assert!(TriggerKind::Manual.fires("manual"));
        assert!(!TriggerKind::Manual.fires("schedule"));
    }
}
