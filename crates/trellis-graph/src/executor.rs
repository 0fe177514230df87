use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use trellis_core::error::{Result, TrellisError};
use trellis_core::state::ExecutionState;
use trellis_core::traits::Checkpoint;
use trellis_core::types::END;

use crate::compiled::CompiledGraph;

/// Result of executing a single node.
#[derive(Debug, Clone, Serialize)]
pub struct NodeResult {
    /// Which node was executed.
    pub node: String,
    /// Superstep the node ran in, starting at 1.
    pub step: usize,
    pub succeeded: bool,
    /// Error text when the node failed.
    pub error: Option<String>,
    /// Execution time in milliseconds.
    pub elapsed_ms: u64,
}

/// Result of executing an entire graph.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub run_id: String,
    /// Per-node results in execution order.
    pub node_results: Vec<NodeResult>,
    /// Final state with every successful node's output merged in.
    pub state: ExecutionState,
    /// Supersteps taken.
    pub steps: usize,
    pub total_elapsed_ms: u64,
    /// Whether every executed node succeeded.
    pub succeeded: bool,
}

impl ExecutionResult {
    /// Names of nodes that ran, in execution order.
    pub fn executed_nodes(&self) -> Vec<&str> {
        self.node_results.iter().map(|r| r.node.as_str()).collect()
    }

    pub fn failed_nodes(&self) -> Vec<&str> {
        self.node_results
            .iter()
            .filter(|r| !r.succeeded)
            .map(|r| r.node.as_str())
            .collect()
    }
}

impl CompiledGraph {
    /// Run the graph to completion.
    ///
    /// Nodes scheduled together form a superstep and run concurrently on a
    /// snapshot of the state; their outputs are merged in schedule order.
    /// A failed node schedules no successors. With a checkpointer attached,
    /// a checkpoint is saved after every superstep under `thread_id` (or
    /// the run id when none is given).
    pub async fn invoke(
        &self,
        initial: ExecutionState,
        thread_id: Option<&str>,
    ) -> Result<ExecutionResult> {
        let start = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let thread = thread_id.unwrap_or(&run_id).to_string();

        let mut state = initial;
        let mut node_results = Vec::new();
        let mut frontier = self.entry_points.clone();
        let mut step = 0;

        info!(
            graph = %self.id,
            pattern = %self.pattern,
            run_id = %run_id,
            entry = ?frontier,
            "Starting graph run"
        );

        while !frontier.is_empty() {
            if step >= self.recursion_limit {
                warn!(
                    run_id = %run_id,
                    limit = self.recursion_limit,
                    pending = ?frontier,
                    "Recursion limit reached"
                );
                return Err(TrellisError::RecursionLimit(self.recursion_limit));
            }
            step += 1;

            let mut runs = Vec::with_capacity(frontier.len());
            for name in &frontier {
                let node = self.nodes.get(name).cloned().ok_or_else(|| {
                    TrellisError::Routing(format!("Node '{}' not found in graph", name))
                })?;
                let snapshot = state.clone();
                let name = name.clone();
                runs.push(async move {
                    let node_start = Instant::now();
                    let outcome = node.run(snapshot).await;
                    (name, outcome, node_start.elapsed().as_millis() as u64)
                });
            }
            let outcomes = join_all(runs).await;

            let mut completed = Vec::new();
            for (name, outcome, elapsed_ms) in outcomes {
                match outcome {
                    Ok(update) => {
                        state.merge(&update);
                        debug!(node = %name, step, elapsed_ms, "Node execution complete");
                        node_results.push(NodeResult {
                            node: name.clone(),
                            step,
                            succeeded: true,
                            error: None,
                            elapsed_ms,
                        });
                        completed.push(name);
                    }
                    Err(e) => {
                        error!(node = %name, step, error = %e, "Graph node failed");
                        node_results.push(NodeResult {
                            node: name,
                            step,
                            succeeded: false,
                            error: Some(e.to_string()),
                            elapsed_ms,
                        });
                    }
                }
            }

            let mut next: Vec<String> = Vec::new();
            for name in &completed {
                for target in self.next_nodes(name, &state)? {
                    if target != END && !next.contains(&target) {
                        next.push(target);
                    }
                }
            }

            if let Some(ref saver) = self.checkpointer {
                saver.save(Checkpoint {
                    thread_id: thread.clone(),
                    step,
                    completed_nodes: completed.clone(),
                    state: serde_json::to_value(&state)
                        .map_err(|e| TrellisError::Checkpoint(e.to_string()))?,
                    timestamp: Utc::now(),
                })?;
            }

            frontier = next;
        }

        let total_elapsed_ms = start.elapsed().as_millis() as u64;
        let succeeded = node_results.iter().all(|r| r.succeeded);
        info!(
            run_id = %run_id,
            steps = step,
            nodes = node_results.len(),
            succeeded,
            total_elapsed_ms,
            "Graph run complete"
        );

        Ok(ExecutionResult {
            run_id,
            node_results,
            state,
            steps: step,
            total_elapsed_ms,
            succeeded,
        })
    }

    /// Static successors plus any router decision for `node`.
    fn next_nodes(&self, node: &str, state: &ExecutionState) -> Result<Vec<String>> {
        let mut next: Vec<String> = self.successors(node).into_iter().map(String::from).collect();
        for cond in self.conditional.iter().filter(|c| c.source == node) {
            let label = (cond.router)(state);
            let target = cond.destinations.get(&label).ok_or_else(|| {
                TrellisError::Routing(format!(
                    "Router on '{}' returned undeclared destination '{}'",
                    node, label
                ))
            })?;
            debug!(from = %node, to = %target, "Conditional route taken");
            next.push(target.clone());
        }
        Ok(next)
    }
}
