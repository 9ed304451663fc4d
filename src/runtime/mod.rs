/// Runtime execution engine
///
/// - `planner`: deterministic topological plan of a validated graph
/// - `context`: per-execution node state and outputs
/// - `engine`: the coordinator driving one execution to a record
/// - `executor`: node executors and their registry
/// - `scheduler`: cron jobs for schedule triggers

pub mod context;
pub mod engine;
pub mod executor;
pub mod planner;
pub mod scheduler;
pub mod template;

pub use context::ExecutionContext;
pub use engine::{ExecutionRequest, ScenarioEngine};
pub use executor::{ExecutorRegistry, NodeExecutor, ToolRegistry};
pub use planner::{plan, ExecutionPlan};
pub use scheduler::ScheduleService;
