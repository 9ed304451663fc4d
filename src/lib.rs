/// Scenario engine: graph orchestration for scenario and workflow definitions
///
/// Validates authored node/edge graphs, plans them deterministically and
/// runs them through pluggable node executors, writing one immutable
/// execution record per run.

// Configuration with environment overrides
pub mod config;

// SQLite pool setup shared by storage and records
pub mod database;

// Error taxonomy (validation, node, engine)
pub mod error;

// Definition model, validation, versioned storage and hot-reload registry
pub mod scenario;

// Planner, coordinator, executors and schedule triggers
pub mod runtime;

// Execution records and sinks
pub mod record;

// Application wiring used by the binary
pub mod app;

pub use config::Config;
pub use error::{EngineError, NodeError, ValidationError, ValidationErrors};
pub use record::{ExecutionRecord, ExecutionStatus, NodeStatus, RecordSink};
pub use runtime::{ExecutionRequest, ScenarioEngine};
pub use scenario::{DefinitionRef, OrchestrationDefinition, ScenarioRegistry, VersionSelector};
