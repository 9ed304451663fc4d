/// Validated graph model
///
/// Turns an `OrchestrationDefinition` into a petgraph `DiGraph` and checks
/// it is executable. All validation problems are collected so the editor
/// can show them together.

use crate::error::{ValidationError, ValidationErrors};
use crate::runtime::executor::ExecutorRegistry;
use crate::scenario::types::{Node, NodeKind, OrchestrationDefinition};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::{Bfs, EdgeRef};
use petgraph::Direction;
use std::collections::HashMap;
use std::sync::Arc;

/// Edge weight: the branch label written by the editor
#[derive(Debug, Clone)]
pub struct BranchLabel(pub Option<String>);

/// A definition that passed validation and is safe to plan
///
/// Node indices equal authoring positions in `definition.nodes`, so
/// `NodeIndex::index()` doubles as the tie-break key for planning.
#[derive(Debug, Clone)]
pub struct ValidatedGraph {
    definition: Arc<OrchestrationDefinition>,
    graph: DiGraph<NodeKind, BranchLabel>,
    index_by_id: HashMap<String, NodeIndex>,
    reachable: Vec<bool>,
    triggers: Vec<NodeIndex>,
}

impl ValidatedGraph {
    /// Validate a definition against the kinds the registry can execute
    pub fn load(
        definition: Arc<OrchestrationDefinition>,
        registry: &ExecutorRegistry,
    ) -> Result<Self, ValidationErrors> {
        let mut errors = Vec::new();

        if definition.nodes.is_empty() {
            tracing::warn!("🚫 Refusing definition with zero nodes");
            return Err(ValidationErrors::single(ValidationError::EmptyGraph { node_count: 0 }));
        }

        let mut graph = DiGraph::with_capacity(definition.nodes.len(), definition.edges.len());
        let mut index_by_id = HashMap::new();

        for node in &definition.nodes {
            let kind = match node.kind() {
                Some(kind) if registry.supports(kind) => kind,
                _ => {
                    errors.push(ValidationError::UnknownNodeType {
                        node_id: node.id.clone(),
                        node_type: node.node_type.clone(),
                    });
                    // Placeholder weight keeps indices aligned with authoring order
                    NodeKind::Action
                }
            };

            let index = graph.add_node(kind);
            if index_by_id.insert(node.id.clone(), index).is_some() {
                errors.push(ValidationError::DuplicateNodeId(node.id.clone()));
            }
        }

        let triggers: Vec<NodeIndex> = definition
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.kind() == Some(NodeKind::Trigger))
            .map(|(position, _)| NodeIndex::new(position))
            .collect();

        if triggers.is_empty() {
            errors.push(ValidationError::EmptyGraph {
                node_count: definition.nodes.len(),
            });
        }

        for edge in &definition.edges {
            let from = index_by_id.get(&edge.from);
            let to = index_by_id.get(&edge.to);

            match (from, to) {
                (Some(&from), Some(&to)) => {
                    graph.add_edge(from, to, BranchLabel(edge.condition.clone()));
                }
                _ => {
                    let missing = if from.is_none() { &edge.from } else { &edge.to };
                    errors.push(ValidationError::DanglingEdge {
                        from: edge.from.clone(),
                        to: edge.to.clone(),
                        missing: missing.clone(),
                    });
                }
            }
        }

        let reachable = reachable_from(&graph, &triggers);
        errors.extend(reachable_cycles(&graph, &reachable, &definition));

        if let Some(errors) = ValidationErrors::new(errors) {
            tracing::warn!("🚫 Definition rejected: {}", errors);
            return Err(errors);
        }

        tracing::debug!(
            "✅ Definition validated: {} nodes, {} edges, {} triggers",
            graph.node_count(),
            graph.edge_count(),
            triggers.len()
        );

        Ok(Self {
            definition,
            graph,
            index_by_id,
            reachable,
            triggers,
        })
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn node(&self, index: NodeIndex) -> &Node {
        &self.definition.nodes[index.index()]
    }

    pub fn id(&self, index: NodeIndex) -> &str {
        &self.node(index).id
    }

    pub fn kind(&self, index: NodeIndex) -> NodeKind {
        self.graph[index]
    }

    pub fn index_of(&self, id: &str) -> Option<NodeIndex> {
        self.index_by_id.get(id).copied()
    }

    pub fn is_reachable(&self, index: NodeIndex) -> bool {
        self.reachable[index.index()]
    }

    /// Trigger nodes in authoring order
    pub fn triggers(&self) -> &[NodeIndex] {
        &self.triggers
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn branch_label(&self, edge: EdgeIndex) -> Option<&str> {
        self.graph[edge].0.as_deref()
    }

    /// Outgoing edges as (edge, target)
    pub fn outgoing(&self, index: NodeIndex) -> impl Iterator<Item = (EdgeIndex, NodeIndex)> + '_ {
        self.graph
            .edges_directed(index, Direction::Outgoing)
            .map(|edge| (edge.id(), edge.target()))
    }

    /// Incoming edges as (edge, source)
    pub fn incoming(&self, index: NodeIndex) -> impl Iterator<Item = (EdgeIndex, NodeIndex)> + '_ {
        self.graph
            .edges_directed(index, Direction::Incoming)
            .map(|edge| (edge.id(), edge.source()))
    }
}

/// Breadth-first reachability from every trigger
fn reachable_from(graph: &DiGraph<NodeKind, BranchLabel>, starts: &[NodeIndex]) -> Vec<bool> {
    let mut reachable = vec![false; graph.node_count()];

    for &start in starts {
        if reachable[start.index()] {
            continue;
        }
        let mut bfs = Bfs::new(graph, start);
        while let Some(index) = bfs.next(graph) {
            reachable[index.index()] = true;
        }
    }

    reachable
}

/// Strongly connected components that form a cycle and touch a reachable node
fn reachable_cycles(
    graph: &DiGraph<NodeKind, BranchLabel>,
    reachable: &[bool],
    definition: &OrchestrationDefinition,
) -> Vec<ValidationError> {
    let mut cycles: Vec<Vec<NodeIndex>> = tarjan_scc(graph)
        .into_iter()
        .filter(|component| {
            component.len() > 1 || graph.contains_edge(component[0], component[0])
        })
        .filter(|component| component.iter().any(|index| reachable[index.index()]))
        .map(|mut component| {
            component.sort();
            component
        })
        .collect();

    cycles.sort();

    cycles
        .into_iter()
        .map(|component| ValidationError::Cycle {
            nodes: component
                .iter()
                .map(|index| definition.nodes[index.index()].id.clone())
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn definition(doc: serde_json::Value) -> Arc<OrchestrationDefinition> {
        Arc::new(serde_json::from_value(doc).unwrap())
    }

    fn load(doc: serde_json::Value) -> Result<ValidatedGraph, ValidationErrors> {
        ValidatedGraph::load(definition(doc), &ExecutorRegistry::noop())
    }

    #[test]
    fn empty_definition_is_rejected() {
        let errors = load(json!({ "nodes": [], "edges": [] })).unwrap_err();
        assert_eq!(
            errors.errors(),
            &[ValidationError::EmptyGraph { node_count: 0 }]
        );
    }

    #[test]
    fn definition_without_trigger_is_rejected() {
        let errors = load(json!({
            "nodes": [{ "id": "a", "type": "action" }],
            "edges": []
        }))
        .unwrap_err();
        assert!(errors.contains(|e| matches!(e, ValidationError::EmptyGraph { node_count: 1 })));
    }

    #[test]
    fn two_node_cycle_is_rejected() {
        let errors = load(json!({
            "nodes": [
                { "id": "t", "type": "trigger" },
                { "id": "a", "type": "action" },
                { "id": "b", "type": "action" }
            ],
            "edges": [
                { "from": "t", "to": "a" },
                { "from": "a", "to": "b" },
                { "from": "b", "to": "a" }
            ]
        }))
        .unwrap_err();

        assert_eq!(
            errors.errors(),
            &[ValidationError::Cycle { nodes: vec!["a".into(), "b".into()] }]
        );
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let errors = load(json!({
            "nodes": [{ "id": "t", "type": "trigger" }, { "id": "a", "type": "action" }],
            "edges": [{ "from": "t", "to": "a" }, { "from": "a", "to": "a" }]
        }))
        .unwrap_err();
        assert!(errors.contains(|e| matches!(e, ValidationError::Cycle { nodes } if nodes == &["a"])));
    }

    #[test]
    fn unreachable_cycle_is_tolerated() {
        let graph = load(json!({
            "nodes": [
                { "id": "t", "type": "trigger" },
                { "id": "x", "type": "action" },
                { "id": "y", "type": "action" }
            ],
            "edges": [{ "from": "x", "to": "y" }, { "from": "y", "to": "x" }]
        }))
        .unwrap();

        assert!(graph.is_reachable(graph.index_of("t").unwrap()));
        assert!(!graph.is_reachable(graph.index_of("x").unwrap()));
    }

    #[test]
    fn all_problems_are_collected() {
        let errors = load(json!({
            "nodes": [
                { "id": "t", "type": "trigger" },
                { "id": "a", "type": "teleport" },
                { "id": "a", "type": "action" }
            ],
            "edges": [{ "from": "t", "to": "ghost" }]
        }))
        .unwrap_err();

        assert!(errors.contains(|e| matches!(e, ValidationError::UnknownNodeType { node_type, .. } if node_type == "teleport")));
        assert!(errors.contains(|e| matches!(e, ValidationError::DuplicateNodeId(id) if id == "a")));
        assert!(errors.contains(|e| matches!(e, ValidationError::DanglingEdge { missing, .. } if missing == "ghost")));
        assert_eq!(errors.errors().len(), 3);
    }

    #[test]
    fn kind_without_registered_executor_is_unknown() {
        let registry = ExecutorRegistry::builder().build();
        let errors = ValidatedGraph::load(
            definition(json!({ "nodes": [{ "id": "t", "type": "trigger" }] })),
            &registry,
        )
        .unwrap_err();
        assert!(errors.contains(|e| matches!(e, ValidationError::UnknownNodeType { .. })));
    }
}
