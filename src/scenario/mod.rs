/// Scenario definitions
///
/// - `types`: the persisted definition document
/// - `graph`: validation into an executable graph
/// - `storage`: versioned SQLite persistence
/// - `registry`: in-memory hot-reload registry resolving `DefinitionRef`s

pub mod graph;
pub mod registry;
pub mod storage;
pub mod types;

pub use graph::ValidatedGraph;
pub use registry::{DefinitionRef, ResolvedDefinition, ScenarioRegistry, VersionSelector};
pub use storage::ScenarioStorage;
pub use types::{Edge, Node, NodeKind, OrchestrationDefinition, TriggerKind};
