/// Execution planner
///
/// Orders the reachable nodes of a validated graph with Kahn's algorithm.
/// Among nodes that are ready at the same time the one authored first wins,
/// so the same definition always yields the same order.

use crate::scenario::graph::ValidatedGraph;
use crate::scenario::types::NodeKind;
use petgraph::graph::NodeIndex;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Static plan for one definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    /// Reachable nodes in topological order
    pub order: Vec<NodeIndex>,
    /// Nodes no trigger can reach; reported as skipped, never executed
    pub unreachable: Vec<NodeIndex>,
    /// Condition nodes whose live successors are decided at run time
    pub branch_points: Vec<NodeIndex>,
}

impl ExecutionPlan {
    pub fn is_branch_point(&self, index: NodeIndex) -> bool {
        self.branch_points.contains(&index)
    }
}

/// Compute the execution plan of a validated graph
pub fn plan(graph: &ValidatedGraph) -> ExecutionPlan {
    let node_count = graph.node_count();
    let mut in_degree = vec![0usize; node_count];

    for index in graph.nodes().filter(|&i| graph.is_reachable(i)) {
        for (_, target) in graph.outgoing(index) {
            in_degree[target.index()] += 1;
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = graph
        .nodes()
        .filter(|&i| graph.is_reachable(i) && in_degree[i.index()] == 0)
        .map(|i| Reverse(i.index()))
        .collect();

    let mut order = Vec::with_capacity(node_count);

    while let Some(Reverse(position)) = ready.pop() {
        let index = NodeIndex::new(position);
        order.push(index);

        for (_, target) in graph.outgoing(index) {
            let degree = &mut in_degree[target.index()];
            *degree -= 1;
            if *degree == 0 {
                ready.push(Reverse(target.index()));
            }
        }
    }

    let unreachable: Vec<NodeIndex> = graph.nodes().filter(|&i| !graph.is_reachable(i)).collect();
    let branch_points: Vec<NodeIndex> = order
        .iter()
        .copied()
        .filter(|&i| graph.kind(i) == NodeKind::Condition)
        .collect();

    tracing::debug!(
        "📋 Planned {} nodes ({} unreachable, {} branch points)",
        order.len(),
        unreachable.len(),
        branch_points.len()
    );

    ExecutionPlan {
        order,
        unreachable,
        branch_points,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::executor::ExecutorRegistry;
    use crate::scenario::types::OrchestrationDefinition;
    use serde_json::json;
    use std::sync::Arc;

    fn graph(doc: serde_json::Value) -> ValidatedGraph {
        let definition: OrchestrationDefinition = serde_json::from_value(doc).unwrap();
        ValidatedGraph::load(Arc::new(definition), &ExecutorRegistry::noop()).unwrap()
    }

    fn ids(graph: &ValidatedGraph, indices: &[NodeIndex]) -> Vec<String> {
        indices.iter().map(|&i| graph.id(i).to_string()).collect()
    }

    fn diamond() -> ValidatedGraph {
        // Authored out of execution order on purpose
        graph(json!({
            "nodes": [
                { "id": "join", "type": "action" },
                { "id": "right", "type": "action" },
                { "id": "t", "type": "trigger" },
                { "id": "left", "type": "action" },
                { "id": "orphan", "type": "action" },
                { "id": "cond", "type": "condition" }
            ],
            "edges": [
                { "from": "t", "to": "cond" },
                { "from": "cond", "to": "left", "condition": "true" },
                { "from": "cond", "to": "right", "condition": "false" },
                { "from": "left", "to": "join" },
                { "from": "right", "to": "join" },
                { "from": "orphan", "to": "join" }
            ]
        }))
    }

    #[test]
    fn every_node_follows_its_predecessors() {
        let graph = diamond();
        let plan = plan(&graph);
        let position = |index: NodeIndex| plan.order.iter().position(|&i| i == index);

        for &index in &plan.order {
            for (_, source) in graph.incoming(index) {
                if graph.is_reachable(source) {
                    assert!(position(source) < position(index));
                }
            }
        }
        assert_eq!(ids(&graph, &plan.order), ["t", "cond", "right", "left", "join"]);
    }

    #[test]
    fn unreachable_nodes_are_reported() {
        let graph = diamond();
        let plan = plan(&graph);
        assert_eq!(ids(&graph, &plan.unreachable), ["orphan"]);
        assert!(!plan.order.contains(&graph.index_of("orphan").unwrap()));
    }

    #[test]
    fn condition_nodes_are_branch_points() {
        let graph = diamond();
        let plan = plan(&graph);
        assert_eq!(ids(&graph, &plan.branch_points), ["cond"]);
        assert!(plan.is_branch_point(graph.index_of("cond").unwrap()));
    }

    #[test]
    fn planning_is_deterministic() {
        let graph = diamond();
        let first = plan(&graph);
        for _ in 0..10 {
            assert_eq!(plan(&graph), first);
        }
        assert_eq!(plan(&diamond()), first);
    }

    #[test]
    fn independent_triggers_keep_authoring_order() {
        let graph = graph(json!({
            "nodes": [
                { "id": "b", "type": "action" },
                { "id": "t2", "type": "trigger" },
                { "id": "t1", "type": "trigger" },
                { "id": "a", "type": "action" }
            ],
            "edges": [{ "from": "t1", "to": "a" }, { "from": "t2", "to": "b" }]
        }));
        assert_eq!(ids(&graph, &plan(&graph).order), ["t2", "b", "t1", "a"]);
    }
}
