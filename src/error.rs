/// Error taxonomy for the orchestration engine
///
/// - `ValidationError`: graph content problems found before any node runs
/// - `NodeError`: a single executor failed; recorded, never crashes a run
/// - `EngineError`: the run produced no record (validation, lookup, infrastructure)

use std::fmt;
use thiserror::Error;

/// A single problem found while validating a definition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Zero nodes, or no node of type `trigger`
    #[error("definition has no trigger node ({node_count} nodes)")]
    EmptyGraph { node_count: usize },

    #[error("duplicate node id '{0}'")]
    DuplicateNodeId(String),

    /// An edge endpoint does not reference a node in the same definition
    #[error("edge {from} -> {to} references missing node '{missing}'")]
    DanglingEdge {
        from: String,
        to: String,
        missing: String,
    },

    /// Reachable nodes form a cycle; `nodes` lists the members in authoring order
    #[error("cycle detected among nodes [{}]", .nodes.join(", "))]
    Cycle { nodes: Vec<String> },

    /// Node type is not recognised or has no registered executor
    #[error("node '{node_id}' has unknown type '{node_type}'")]
    UnknownNodeType { node_id: String, node_type: String },
}

/// All validation problems of one definition (never empty)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    pub(crate) fn new(errors: Vec<ValidationError>) -> Option<Self> {
        if errors.is_empty() {
            None
        } else {
            Some(Self(errors))
        }
    }

    pub(crate) fn single(error: ValidationError) -> Self {
        Self(vec![error])
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.0
    }

    pub fn contains(&self, predicate: impl Fn(&ValidationError) -> bool) -> bool {
        self.0.iter().any(predicate)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "invalid definition: {}", messages.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// Failure reported by a node executor
#[derive(Debug, Clone, Error)]
pub enum NodeError {
    #[error("missing config field '{0}'")]
    MissingConfig(&'static str),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("tool '{tool}' failed: {message}")]
    Tool { tool: String, message: String },

    #[error("provider '{provider}' failed: {message}")]
    Provider { provider: String, message: String },

    #[error("expression failed: {0}")]
    Expression(String),

    #[error("input resolution failed: {0}")]
    Input(String),

    #[error("trigger type '{configured}' does not fire for a {invoked} invocation")]
    TriggerMismatch { configured: String, invoked: String },

    /// No executor registered at dispatch time
    #[error("no executor registered for node type '{0}'")]
    Unregistered(String),

    /// The executor task panicked or was aborted
    #[error("executor crashed: {0}")]
    Crashed(String),

    #[error("timed out after {0} ms")]
    Timeout(u64),

    #[error("cancelled")]
    Cancelled,
}

/// Errors returned instead of an execution record
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error("scenario '{0}' not found")]
    DefinitionNotFound(String),

    #[error("scenario '{scenario_id}' has no version {version}")]
    VersionNotFound { scenario_id: String, version: String },

    /// Persistence or dispatch failure unrelated to graph content
    #[error("infrastructure failure: {0}")]
    Infrastructure(#[source] anyhow::Error),
}

impl EngineError {
    /// Whether the caller sent bad graph content (4xx-equivalent)
    pub fn is_client_error(&self) -> bool {
        !matches!(self, EngineError::Infrastructure(_))
    }
}
