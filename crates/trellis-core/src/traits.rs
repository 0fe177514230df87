use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::state::ExecutionState;
use crate::types::AgentKind;

/// The opaque unit of work behind a graph vertex.
pub trait AgentNode: Send + Sync + 'static {
    /// Which agent this node implements.
    fn kind(&self) -> AgentKind;

    /// Run the agent against a snapshot of the execution state.
    ///
    /// Returns a partial state that the executor merges back.
    fn run(&self, state: ExecutionState) -> BoxFuture<'_, Result<ExecutionState>>;
}

/// A state snapshot taken after a superstep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Conversation / run thread being checkpointed.
    pub thread_id: String,
    /// Superstep number at which the snapshot was taken.
    pub step: usize,
    /// Nodes that ran during this superstep.
    pub completed_nodes: Vec<String>,
    /// Serialized execution state.
    pub state: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Persistence backend for graph runs.
pub trait CheckpointSaver: Send + Sync + 'static {
    fn save(&self, checkpoint: Checkpoint) -> Result<()>;

    /// Latest checkpoint for a thread.
    fn latest(&self, thread_id: &str) -> Result<Option<Checkpoint>>;

    /// All checkpoints for a thread, oldest first.
    fn list(&self, thread_id: &str) -> Result<Vec<Checkpoint>>;
}

/// Owner of the checkpoint saver.
pub trait MemoryManager: Send + Sync + 'static {
    /// The saver to attach at compile time, when checkpointing is available.
    fn memory_saver(&self) -> Option<Arc<dyn CheckpointSaver>>;
}
