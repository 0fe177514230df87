//! Fake agent nodes and fixtures shared by Trellis tests.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use trellis_core::error::{Result, TrellisError};
use trellis_core::state::{ExecutionState, QUERY_PROFILE_KEY};
use trellis_core::traits::{AgentNode, MemoryManager};
use trellis_core::types::AgentKind;
use trellis_graph::{CheckpointMemory, NodeTable};

static TRACING: Once = Once::new();

/// Install a test subscriber once. Honors `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trellis=debug,warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

fn echo(kind: AgentKind, state: &ExecutionState) -> ExecutionState {
    let query = state.get_str("query").unwrap_or_default();
    let mut out = ExecutionState::new();
    out.set_str(kind.as_str(), format!("{} output for: {}", kind, query));
    out
}

/// Writes `"<kind> output for: <query>"` under its own name and counts runs.
pub struct EchoNode {
    kind: AgentKind,
    runs: Arc<AtomicUsize>,
}

impl EchoNode {
    pub fn new(kind: AgentKind) -> Self {
        Self {
            kind,
            runs: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared run counter, readable after the node moves into a table.
    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.runs)
    }
}

impl AgentNode for EchoNode {
    fn kind(&self) -> AgentKind {
        self.kind
    }

    fn run(&self, state: ExecutionState) -> BoxFuture<'_, Result<ExecutionState>> {
        Box::pin(async move {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(echo(self.kind, &state))
        })
    }
}

/// Always fails with [`TrellisError::NodeExecution`].
pub struct FailingNode {
    kind: AgentKind,
    message: String,
}

impl FailingNode {
    pub fn new(kind: AgentKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl AgentNode for FailingNode {
    fn kind(&self) -> AgentKind {
        self.kind
    }

    fn run(&self, _state: ExecutionState) -> BoxFuture<'_, Result<ExecutionState>> {
        Box::pin(async move {
            Err(TrellisError::NodeExecution {
                node: self.kind.to_string(),
                message: self.message.clone(),
            })
        })
    }
}

/// Refiner that also writes a query profile, as a classifier would.
pub struct ProfileRefiner {
    profile: Value,
}

impl ProfileRefiner {
    pub fn new(profile: Value) -> Self {
        Self { profile }
    }
}

impl AgentNode for ProfileRefiner {
    fn kind(&self) -> AgentKind {
        AgentKind::Refiner
    }

    fn run(&self, state: ExecutionState) -> BoxFuture<'_, Result<ExecutionState>> {
        Box::pin(async move {
            let mut out = echo(AgentKind::Refiner, &state);
            out.set(QUERY_PROFILE_KEY, self.profile.clone());
            Ok(out)
        })
    }
}

/// Echo node that sleeps first.
pub struct SlowNode {
    kind: AgentKind,
    delay: Duration,
}

impl SlowNode {
    pub fn new(kind: AgentKind, delay: Duration) -> Self {
        Self { kind, delay }
    }
}

impl AgentNode for SlowNode {
    fn kind(&self) -> AgentKind {
        self.kind
    }

    fn run(&self, state: ExecutionState) -> BoxFuture<'_, Result<ExecutionState>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            Ok(echo(self.kind, &state))
        })
    }
}

/// An [`EchoNode`] for every agent kind.
pub fn node_table() -> NodeTable {
    let mut table = NodeTable::new();
    for kind in AgentKind::ALL {
        table.register(EchoNode::new(kind));
    }
    table
}

/// [`node_table`] with some nodes replaced.
pub fn node_table_with(overrides: impl IntoIterator<Item = Arc<dyn AgentNode>>) -> NodeTable {
    let mut table = node_table();
    for node in overrides {
        table.register_arc(node);
    }
    table
}

/// Profile the router treats as a data lookup.
pub fn action_query_profile() -> Value {
    json!({
        "intent": "action",
        "action_type": "query",
        "table": "orders"
    })
}

/// Profile for a plain informational question.
pub fn informational_profile() -> Value {
    json!({ "intent": "informational" })
}

/// Memory manager backed by a fresh in-memory saver.
pub fn in_memory_checkpoints() -> Arc<dyn MemoryManager> {
    Arc::new(CheckpointMemory::in_memory())
}

/// Memory manager that has no saver to offer.
pub fn no_checkpoints() -> Arc<dyn MemoryManager> {
    Arc::new(CheckpointMemory::disabled())
}

/// Write `contents` to a temporary `.toml` file.
pub fn temp_config(contents: &str) -> std::io::Result<tempfile::NamedTempFile> {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    Ok(file)
}
