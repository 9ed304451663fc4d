/// Execution runtime
///
/// Runs one scenario execution as a single coordinating task that owns the
/// `ExecutionContext`. Ready nodes are dispatched onto a `JoinSet` (bounded
/// by `max_concurrency`); their results come back to the coordinator, which
/// is the only writer of node state.
///
/// Edge liveness drives the per-node state machine:
/// - a succeeded node makes its outgoing edges live (for condition nodes
///   only the edges selected by the branch selector)
/// - a failed node, or a node skipped because of a failure, makes its
///   outgoing edges dead-by-failure
/// - a node skipped because a branch was not taken makes its outgoing edges
///   dead-by-branch
///
/// A pending node is decided once every incoming edge is decided: any
/// dead-by-failure edge skips it, otherwise any live edge makes it ready,
/// otherwise it is skipped as an untaken branch.

use crate::config::EngineConfig;
use crate::error::{EngineError, NodeError};
use crate::record::{
    ExecutionFailure, ExecutionRecord, ExecutionStatus, FailureKind, NodeReport, NodeStatus,
    RecordSink,
};
use crate::runtime::context::ExecutionContext;
use crate::runtime::executor::{ExecutorRegistry, NodeInvocation, NodeOutput};
use crate::runtime::planner::{self, ExecutionPlan};
use crate::scenario::graph::ValidatedGraph;
use crate::scenario::registry::{DefinitionRef, ScenarioRegistry};
use crate::scenario::types::{NodeKind, OrchestrationDefinition, TriggerKind};
use chrono::Utc;
use petgraph::graph::{EdgeIndex, NodeIndex};
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Invocation contract consumed from the API layer
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub definition: DefinitionRef,
    pub input: Value,
    pub triggered_by: String,
    pub trigger: TriggerKind,
}

impl ExecutionRequest {
    /// Manual run of the active version
    pub fn manual(scenario_id: impl Into<String>, input: Value, triggered_by: impl Into<String>) -> Self {
        Self {
            definition: DefinitionRef::active(scenario_id),
            input,
            triggered_by: triggered_by.into(),
            trigger: TriggerKind::Manual,
        }
    }
}

/// Identity of the definition being run, copied into the record
#[derive(Debug, Clone)]
struct RunTarget {
    scenario_id: String,
    version: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EdgeState {
    Pending,
    Live,
    DeadBranch,
    DeadFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Ready,
    SkipBranch,
    SkipUpstreamFailed,
}

type NodeResult = (NodeIndex, Result<NodeOutput, NodeError>, Duration);

pub struct ScenarioEngine {
    registry: Arc<ScenarioRegistry>,
    executors: ExecutorRegistry,
    sink: Arc<dyn RecordSink>,
    config: EngineConfig,
}

impl std::fmt::Debug for ScenarioEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioEngine")
            .field("executors", &self.executors)
            .field("config", &self.config)
            .finish()
    }
}

impl ScenarioEngine {
    pub fn new(
        registry: Arc<ScenarioRegistry>,
        executors: ExecutorRegistry,
        sink: Arc<dyn RecordSink>,
        config: EngineConfig,
    ) -> Self {
        Self {
            registry,
            executors,
            sink,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<ScenarioRegistry> {
        &self.registry
    }

    /// Resolve the referenced version and run it
    ///
    /// Returns the written record, or an `EngineError` when no record could
    /// be produced (invalid definition, unknown reference, sink failure).
    pub async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionRecord, EngineError> {
        let resolved = self.registry.resolve(&request.definition)?;
        let target = RunTarget {
            scenario_id: resolved.scenario_id,
            version: Some(resolved.version),
        };
        self.run(
            target,
            resolved.definition,
            request.input,
            request.triggered_by,
            request.trigger,
        )
        .await
    }

    /// Run a definition that is not (or not yet) stored, e.g. an editor test run
    pub async fn execute_definition(
        &self,
        scenario_id: &str,
        definition: Arc<OrchestrationDefinition>,
        input: Value,
        triggered_by: &str,
        trigger: TriggerKind,
    ) -> Result<ExecutionRecord, EngineError> {
        let target = RunTarget {
            scenario_id: scenario_id.to_string(),
            version: None,
        };
        self.run(target, definition, input, triggered_by.to_string(), trigger)
            .await
    }

    async fn run(
        &self,
        target: RunTarget,
        definition: Arc<OrchestrationDefinition>,
        input: Value,
        triggered_by: String,
        trigger: TriggerKind,
    ) -> Result<ExecutionRecord, EngineError> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let execution_id = Uuid::new_v4();

        let graph = ValidatedGraph::load(definition, &self.executors).map_err(|errors| {
            tracing::warn!(
                scenario_id = %target.scenario_id,
                "🚫 Refusing to execute invalid definition: {}",
                errors
            );
            EngineError::Validation(errors)
        })?;
        let plan = planner::plan(&graph);

        tracing::info!(
            execution_id = %execution_id,
            scenario_id = %target.scenario_id,
            "🚀 Starting execution ({} trigger, {} nodes)",
            trigger,
            graph.node_count()
        );

        let mut run = Run::new(&graph, &plan, input, trigger);
        let timed_out = run.drive(self, execution_id).await;

        let finished_at = Utc::now();
        let record = run.finish(
            execution_id,
            target,
            triggered_by,
            timed_out,
            self.config.execution_timeout(),
            clock.elapsed(),
            started_at,
            finished_at,
        );

        match record.status {
            ExecutionStatus::Succeeded => tracing::info!(
                execution_id = %execution_id,
                "✅ Execution succeeded in {}ms",
                record.duration_ms
            ),
            status => tracing::error!(
                execution_id = %execution_id,
                "❌ Execution {} in {}ms: {}",
                status.as_str(),
                record.duration_ms,
                record
                    .error
                    .as_ref()
                    .map(|e| e.message.as_str())
                    .unwrap_or("unknown error")
            ),
        }

        self.sink.write(&record).await.map_err(|e| {
            tracing::error!(execution_id = %execution_id, "💥 Failed to write execution record: {}", e);
            EngineError::Infrastructure(e)
        })?;

        Ok(record)
    }

    fn node_timeout(&self, graph: &ValidatedGraph, index: NodeIndex) -> Duration {
        graph
            .node(index)
            .config("timeoutMs")
            .and_then(Value::as_u64)
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.config.node_timeout())
    }
}

/// Mutable state of one execution, owned by the coordinator
struct Run<'g> {
    graph: &'g ValidatedGraph,
    plan: &'g ExecutionPlan,
    trigger: TriggerKind,
    ctx: ExecutionContext,
    edges: Vec<EdgeState>,
    /// Dispatch start per running node
    running: HashMap<NodeIndex, Instant>,
    queued: Vec<bool>,
    node_errors: HashMap<NodeIndex, NodeError>,
}

impl<'g> Run<'g> {
    fn new(graph: &'g ValidatedGraph, plan: &'g ExecutionPlan, input: Value, trigger: TriggerKind) -> Self {
        let mut run = Self {
            graph,
            plan,
            trigger,
            ctx: ExecutionContext::new(input, graph.node_count()),
            edges: vec![EdgeState::Pending; graph.edge_count()],
            running: HashMap::new(),
            queued: vec![false; graph.node_count()],
            node_errors: HashMap::new(),
        };

        for &index in &plan.unreachable {
            run.ctx
                .mark_skipped(index, Some("unreachable from any trigger".to_string()));
            run.close_outgoing(index, EdgeState::DeadBranch);
        }

        run.match_triggers();
        run
    }

    /// Skip triggers that do not fire for this invocation
    ///
    /// When none fires, the first trigger fails with the mismatch so the
    /// run terminates with a trigger error.
    fn match_triggers(&mut self) {
        let graph = self.graph;
        let mismatched: Vec<NodeIndex> = graph
            .triggers()
            .iter()
            .copied()
            .filter(|&t| !self.trigger.fires(graph.node(t).trigger_type()))
            .collect();

        if mismatched.len() == graph.triggers().len() {
            if let Some((&first, rest)) = mismatched.split_first() {
                let error = NodeError::TriggerMismatch {
                    configured: graph.node(first).trigger_type().to_string(),
                    invoked: self.trigger.to_string(),
                };
                tracing::warn!("🚫 No trigger fires for a {} invocation", self.trigger);
                self.ctx.mark_failed(first, error.to_string(), None);
                self.node_errors.insert(first, error);
                self.close_outgoing(first, EdgeState::DeadFailure);

                for &index in rest {
                    self.skip_trigger(index);
                }
            }
            return;
        }

        for index in mismatched {
            self.skip_trigger(index);
        }
    }

    fn skip_trigger(&mut self, index: NodeIndex) {
        let reason = format!(
            "trigger type '{}' does not fire for a {} invocation",
            self.graph.node(index).trigger_type(),
            self.trigger
        );
        tracing::debug!("⏭️ Skipping trigger '{}': {}", self.graph.id(index), reason);
        self.ctx.mark_skipped(index, Some(reason));
        self.close_outgoing(index, EdgeState::DeadBranch);
    }

    fn close_outgoing(&mut self, index: NodeIndex, state: EdgeState) {
        let edges: Vec<EdgeIndex> = self.graph.outgoing(index).map(|(edge, _)| edge).collect();
        for edge in edges {
            self.edges[edge.index()] = state;
        }
    }

    /// Mark outgoing edges of a succeeded node live or dead-by-branch
    fn open_outgoing(&mut self, index: NodeIndex, branch: Option<&str>) {
        let outgoing: Vec<EdgeIndex> = self.graph.outgoing(index).map(|(edge, _)| edge).collect();

        if !self.plan.is_branch_point(index) {
            for edge in outgoing {
                self.edges[edge.index()] = EdgeState::Live;
            }
            return;
        }

        let selector = branch.unwrap_or("false");
        let matched = outgoing
            .iter()
            .any(|&edge| self.graph.branch_label(edge) == Some(selector));

        for edge in outgoing {
            let live = match self.graph.branch_label(edge) {
                Some(label) => label == selector,
                None => !matched,
            };
            self.edges[edge.index()] = if live {
                EdgeState::Live
            } else {
                EdgeState::DeadBranch
            };
        }
    }

    fn decide(&self, index: NodeIndex) -> Option<Decision> {
        let mut any_live = false;
        let mut any_failure = false;
        let mut has_incoming = false;

        for (edge, _) in self.graph.incoming(index) {
            has_incoming = true;
            match self.edges[edge.index()] {
                EdgeState::Pending => return None,
                EdgeState::Live => any_live = true,
                EdgeState::DeadFailure => any_failure = true,
                EdgeState::DeadBranch => {}
            }
        }

        if !has_incoming {
            // Only triggers are reachable without incoming edges
            return Some(Decision::Ready);
        }
        if any_failure {
            return Some(Decision::SkipUpstreamFailed);
        }
        if any_live {
            return Some(Decision::Ready);
        }
        Some(Decision::SkipBranch)
    }

    /// One pass in topological order deciding every decidable pending node
    fn collect_ready(&mut self, ready: &mut VecDeque<NodeIndex>) {
        let plan = self.plan;
        for &index in &plan.order {
            if self.ctx.status(index) != NodeStatus::Pending || self.queued[index.index()] {
                continue;
            }
            match self.decide(index) {
                Some(Decision::Ready) => {
                    self.queued[index.index()] = true;
                    ready.push_back(index);
                }
                Some(Decision::SkipUpstreamFailed) => {
                    tracing::debug!("⏭️ Skipping '{}': upstream failed", self.graph.id(index));
                    self.ctx
                        .mark_skipped(index, Some("upstream node failed".to_string()));
                    self.close_outgoing(index, EdgeState::DeadFailure);
                }
                Some(Decision::SkipBranch) => {
                    tracing::debug!("⏭️ Skipping '{}': branch not taken", self.graph.id(index));
                    self.ctx
                        .mark_skipped(index, Some("branch not taken".to_string()));
                    self.close_outgoing(index, EdgeState::DeadBranch);
                }
                None => {}
            }
        }
    }

    /// Inputs handed to a node's executor
    fn resolve_inputs(&self, index: NodeIndex) -> Result<Value, NodeError> {
        let graph = self.graph;
        if graph.kind(index) == NodeKind::Trigger {
            return Ok(self.ctx.input().clone());
        }

        if let Some(mappings) = graph.node(index).config("inputs") {
            let mappings = mappings.as_object().ok_or_else(|| {
                NodeError::InvalidConfig("'inputs' must map names to JSONPath expressions".into())
            })?;
            let scope = self.ctx.mapping_scope(|i| graph.id(i));

            let mut resolved = Map::new();
            for (name, path) in mappings {
                let path = path.as_str().ok_or_else(|| {
                    NodeError::InvalidConfig(format!("input '{}' must be a JSONPath string", name))
                })?;
                let mut matches = jsonpath_lib::select(&scope, path)
                    .map_err(|e| NodeError::Input(format!("input '{}' ({}): {:?}", name, path, e)))?;
                let value = match matches.len() {
                    0 => Value::Null,
                    1 => matches.remove(0).clone(),
                    _ => Value::Array(matches.into_iter().cloned().collect()),
                };
                resolved.insert(name.clone(), value);
            }
            return Ok(Value::Object(resolved));
        }

        let mut sources: Vec<NodeIndex> = graph
            .incoming(index)
            .filter(|(edge, _)| self.edges[edge.index()] == EdgeState::Live)
            .map(|(_, source)| source)
            .collect();
        sources.sort();
        sources.dedup();

        match sources.as_slice() {
            [] => Ok(Value::Null),
            [only] => Ok(self.ctx.output(*only).cloned().unwrap_or(Value::Null)),
            many => {
                let mut by_id = Map::new();
                for &source in many {
                    by_id.insert(
                        graph.id(source).to_string(),
                        self.ctx.output(source).cloned().unwrap_or(Value::Null),
                    );
                }
                Ok(Value::Object(by_id))
            }
        }
    }

    /// Dispatch a ready node, or fail it immediately when it cannot start
    fn dispatch(
        &mut self,
        engine: &ScenarioEngine,
        execution_id: Uuid,
        cancel: &CancellationToken,
        tasks: &mut JoinSet<NodeResult>,
        index: NodeIndex,
    ) {
        let graph = self.graph;
        let node = graph.node(index);
        let kind = graph.kind(index);

        let prepared = self.resolve_inputs(index).and_then(|inputs| {
            let executor = engine
                .executors
                .get(kind)
                .ok_or_else(|| NodeError::Unregistered(node.node_type.clone()))?;
            Ok((inputs, executor))
        });

        let (inputs, executor) = match prepared {
            Ok(prepared) => prepared,
            Err(error) => {
                self.fail(index, error, None);
                return;
            }
        };

        let invocation = NodeInvocation {
            execution_id,
            node_id: node.id.clone(),
            kind,
            config: node.data.config.clone(),
            inputs,
            trigger: self.trigger,
            cancel: cancel.child_token(),
        };
        let node_cancel = invocation.cancel.clone();
        let timeout = engine.node_timeout(graph, index);

        tracing::debug!("▶️ Dispatching node '{}' ({})", node.id, kind);
        self.ctx.mark_running(index);
        self.running.insert(index, Instant::now());

        tasks.spawn(async move {
            let started = Instant::now();
            let mut handle = tokio::spawn(async move { executor.execute(invocation).await });

            let result = match tokio::time::timeout(timeout, &mut handle).await {
                Ok(Ok(result)) => result,
                Ok(Err(join_error)) => Err(NodeError::Crashed(join_error.to_string())),
                Err(_) => {
                    // Blocking work (Lua) only notices the token, not the abort
                    node_cancel.cancel();
                    handle.abort();
                    Err(NodeError::Timeout(timeout.as_millis() as u64))
                }
            };

            (index, result, started.elapsed())
        });
    }

    fn complete(&mut self, index: NodeIndex, result: Result<NodeOutput, NodeError>, elapsed: Duration) {
        self.running.remove(&index);
        match result {
            Ok(output) => {
                tracing::debug!(
                    "✅ Node '{}' succeeded in {}ms",
                    self.graph.id(index),
                    elapsed.as_millis()
                );
                self.open_outgoing(index, output.branch.as_deref());
                self.ctx.mark_succeeded(index, output.value, elapsed);
            }
            Err(error) => self.fail(index, error, Some(elapsed)),
        }
    }

    fn fail(&mut self, index: NodeIndex, error: NodeError, elapsed: Option<Duration>) {
        tracing::error!("❌ Node '{}' failed: {}", self.graph.id(index), error);
        self.running.remove(&index);
        self.ctx.mark_failed(index, error.to_string(), elapsed);
        self.node_errors.insert(index, error);
        self.close_outgoing(index, EdgeState::DeadFailure);
    }

    /// Coordinator loop; returns `true` when the execution deadline expired
    async fn drive(&mut self, engine: &ScenarioEngine, execution_id: Uuid) -> bool {
        let deadline = tokio::time::Instant::now() + engine.config.execution_timeout();
        let max_concurrency = engine.config.max_concurrency.max(1);
        let cancel = CancellationToken::new();
        let mut tasks: JoinSet<NodeResult> = JoinSet::new();
        let mut ready = VecDeque::new();

        loop {
            self.collect_ready(&mut ready);

            while tasks.len() < max_concurrency {
                let Some(index) = ready.pop_front() else {
                    break;
                };
                self.dispatch(engine, execution_id, &cancel, &mut tasks, index);
            }

            if tasks.is_empty() {
                if ready.is_empty() {
                    // Nodes failed at dispatch may have unblocked others
                    if self.ctx.pending().any(|i| !self.queued[i.index()] && self.decide(i).is_some()) {
                        continue;
                    }
                    break;
                }
                continue;
            }

            tokio::select! {
                joined = tasks.join_next() => match joined {
                    Some(Ok((index, result, elapsed))) => self.complete(index, result, elapsed),
                    Some(Err(join_error)) => {
                        // Outer tasks only await the executor; reaching this is an abort
                        tracing::error!("💥 Node task ended unexpectedly: {}", join_error);
                    }
                    None => {}
                },
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::warn!(
                        execution_id = %execution_id,
                        "⏰ Execution deadline reached, cancelling {} running nodes",
                        self.running.len()
                    );
                    cancel.cancel();
                    tasks.abort_all();
                    self.expire();
                    return true;
                }
            }
        }

        // Every node is decided once the loop drains
        let undecided: Vec<NodeIndex> = self.ctx.pending().collect();
        for index in undecided {
            self.ctx
                .mark_skipped(index, Some("no live path from a trigger".to_string()));
        }
        false
    }

    /// Deadline expiry: running nodes fail as cancelled, the rest are skipped
    fn expire(&mut self) {
        let running: Vec<(NodeIndex, Instant)> = self.running.drain().collect();
        for (index, started) in running {
            self.ctx
                .mark_failed(index, NodeError::Cancelled.to_string(), Some(started.elapsed()));
            self.node_errors.insert(index, NodeError::Cancelled);
        }

        let pending: Vec<NodeIndex> = self.ctx.pending().collect();
        for index in pending {
            self.ctx
                .mark_skipped(index, Some("execution timed out".to_string()));
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        execution_id: Uuid,
        target: RunTarget,
        triggered_by: String,
        timed_out: bool,
        execution_timeout: Duration,
        elapsed: Duration,
        started_at: chrono::DateTime<Utc>,
        finished_at: chrono::DateTime<Utc>,
    ) -> ExecutionRecord {
        let graph = self.graph;
        let order = &self.plan.order;

        let succeeded = |index: &&NodeIndex| self.ctx.status(**index) == NodeStatus::Succeeded;
        let first_failed = order
            .iter()
            .find(|&&index| self.ctx.status(index) == NodeStatus::Failed)
            .copied();

        let (status, error) = if timed_out {
            let failure = ExecutionFailure {
                kind: FailureKind::Timeout,
                node_id: None,
                message: format!(
                    "execution exceeded its {}ms deadline",
                    execution_timeout.as_millis()
                ),
            };
            (ExecutionStatus::Failed, Some(failure))
        } else if let Some(index) = first_failed {
            let kind = match self.node_errors.get(&index) {
                Some(NodeError::TriggerMismatch { .. }) => FailureKind::Trigger,
                _ => FailureKind::Node,
            };
            let message = self
                .ctx
                .error(index)
                .unwrap_or("node failed")
                .to_string();
            let partial = order
                .iter()
                .filter(succeeded)
                .any(|&index| graph.kind(index) != NodeKind::Trigger);
            let status = if partial {
                ExecutionStatus::Partial
            } else {
                ExecutionStatus::Failed
            };
            let failure = ExecutionFailure {
                kind,
                node_id: Some(graph.id(index).to_string()),
                message,
            };
            (status, Some(failure))
        } else {
            (ExecutionStatus::Succeeded, None)
        };

        let output_node = if status == ExecutionStatus::Succeeded {
            order
                .iter()
                .filter(succeeded)
                .filter(|&&index| {
                    graph
                        .outgoing(index)
                        .all(|(edge, _)| self.edges[edge.index()] != EdgeState::Live)
                })
                .last()
        } else {
            order.iter().filter(succeeded).last()
        };
        let output = output_node
            .and_then(|&index| self.ctx.output(index).cloned())
            .unwrap_or(Value::Null);

        let nodes = graph
            .nodes()
            .map(|index| {
                let status = self.ctx.status(index);
                let note = self.ctx.error(index).map(str::to_string);
                NodeReport {
                    node_id: graph.id(index).to_string(),
                    kind: graph.kind(index),
                    status,
                    error: if status == NodeStatus::Failed { note.clone() } else { None },
                    skip_reason: if status == NodeStatus::Skipped { note } else { None },
                    duration_ms: self.ctx.duration(index).map(|d| d.as_millis() as u64),
                }
            })
            .collect();

        ExecutionRecord {
            execution_id,
            scenario_id: target.scenario_id,
            version: target.version,
            status,
            output,
            duration_ms: elapsed.as_millis() as u64,
            error,
            triggered_by,
            trigger: self.trigger,
            started_at,
            finished_at,
            nodes,
        }
    }
}
