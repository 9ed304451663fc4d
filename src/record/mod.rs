/// Execution records
///
/// One immutable `ExecutionRecord` is written per execution through a
/// `RecordSink`. The engine never reads records back.

pub mod sqlite;

pub use sqlite::SqliteRecordStore;

use crate::scenario::types::{NodeKind, TriggerKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Terminal status of an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Succeeded,
    Failed,
    /// A node failed after other work had already succeeded
    ///
    /// Still a failed run: `error` names the failed node and the output is
    /// only the last successful intermediate value.
    Partial,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Succeeded => "succeeded",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Partial => "partial",
        }
    }
}

/// Terminal state of one node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// A node executor failed
    Node,
    /// The execution deadline expired
    Timeout,
    /// No trigger matched the invocation
    Trigger,
}

/// Why an execution did not succeed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionFailure {
    pub kind: FailureKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    pub message: String,
}

/// Per-node trace entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeReport {
    pub node_id: String,
    pub kind: NodeKind,
    pub status: NodeStatus,
    /// Failure message of a failed node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Why a skipped node never ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Immutable summary of one execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub execution_id: Uuid,
    pub scenario_id: String,
    /// Stored version that ran (`None` for ad-hoc definitions)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    pub status: ExecutionStatus,
    pub output: Value,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionFailure>,
    pub triggered_by: String,
    pub trigger: TriggerKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Every node of the definition in authoring order
    pub nodes: Vec<NodeReport>,
}

impl ExecutionRecord {
    pub fn node(&self, node_id: &str) -> Option<&NodeReport> {
        self.nodes.iter().find(|n| n.node_id == node_id)
    }

    pub fn node_status(&self, node_id: &str) -> Option<NodeStatus> {
        self.node(node_id).map(|n| n.status)
    }
}

/// Destination for finished execution records
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn write(&self, record: &ExecutionRecord) -> anyhow::Result<()>;
}

/// Keeps records in memory, used by tests and one-shot CLI runs
#[derive(Debug, Default)]
pub struct MemoryRecordSink {
    records: RwLock<Vec<ExecutionRecord>>,
}

impl MemoryRecordSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<ExecutionRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl RecordSink for MemoryRecordSink {
    async fn write(&self, record: &ExecutionRecord) -> anyhow::Result<()> {
        let mut records = self.records.write().await;
        if records.iter().any(|r| r.execution_id == record.execution_id) {
            return Err(anyhow::anyhow!(
                "execution record {} already written",
                record.execution_id
            ));
        }
        records.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use serde_json::json;

    pub fn record() -> ExecutionRecord {
        let now = Utc::now();
        ExecutionRecord {
            execution_id: Uuid::new_v4(),
            scenario_id: "welcome".into(),
            version: Some(1),
            status: ExecutionStatus::Failed,
            output: json!({ "msg": "hi" }),
            duration_ms: 12,
            error: Some(ExecutionFailure {
                kind: FailureKind::Node,
                node_id: Some("a".into()),
                message: "tool 'echo' failed: boom".into(),
            }),
            triggered_by: "user-1".into(),
            trigger: TriggerKind::Manual,
            started_at: now,
            finished_at: now,
            nodes: vec![NodeReport {
                node_id: "a".into(),
                kind: NodeKind::Action,
                status: NodeStatus::Failed,
                error: Some("boom".into()),
                skip_reason: None,
                duration_ms: Some(3),
            }],
        }
    }
}
