use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use casegraph_core::error::{CaseGraphError, Result};
use casegraph_core::event::EventBus;
use casegraph_core::state::{PartialUpdate, WorkflowState};
use casegraph_core::types::WorkflowEvent;

use super::builder::WorkflowGraph;
use crate::retry::with_abort;

/// Result of executing a single node.
#[derive(Debug, Clone)]
pub struct NodeResult {
    /// Which node was executed.
    pub node_id: String,
    /// Keys the node wrote, sorted.
    pub keys: Vec<String>,
    /// Execution time in milliseconds.
    pub elapsed_ms: u64,
}

/// Result of executing an entire graph.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// The final accumulated state.
    pub state: WorkflowState,
    /// Per-node results in merge order.
    pub node_results: Vec<NodeResult>,
    /// Total execution time in milliseconds.
    pub total_elapsed_ms: u64,
}

type Finished = (usize, u64, Result<PartialUpdate>);

/// Runs a validated graph against an initial state.
///
/// A node starts as soon as all of its predecessors have completed and their
/// updates are merged. Nodes that become ready together run concurrently,
/// each on a snapshot of state taken at launch. Updates are merged one at a
/// time in completion order, so a join always sees every branch's writes.
///
/// On the first node failure nothing new is launched. Nodes already in
/// flight finish the collaborator call they are making but start no further
/// retries; their results are discarded.
#[derive(Default)]
pub struct Executor {
    events: Option<Arc<EventBus>>,
}

impl Executor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish progress events to `bus`.
    pub fn with_events(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    pub async fn run(
        &self,
        graph: &WorkflowGraph,
        initial: WorkflowState,
    ) -> Result<ExecutionResult> {
        let start = Instant::now();
        let mut state = initial;
        let mut node_results = Vec::with_capacity(graph.len());
        let mut remaining: Vec<usize> = (0..graph.len()).map(|i| graph.indegree(i)).collect();
        let mut running: FuturesUnordered<BoxFuture<'static, Finished>> = FuturesUnordered::new();
        let mut first_error: Option<CaseGraphError> = None;
        let abort = CancellationToken::new();

        info!(nodes = graph.len(), "Starting workflow run");

        for &i in graph.order_indices() {
            if remaining[i] == 0 {
                if let Err(e) = self.launch(graph, i, &state, &abort, &mut running) {
                    abort.cancel();
                    first_error = Some(e);
                    break;
                }
            }
        }

        while let Some((i, elapsed_ms, outcome)) = running.next().await {
            let node_id = graph.node_at(i).id.clone();

            let update = match outcome {
                Ok(update) => update,
                Err(e) => {
                    error!(node = %node_id, error = %e, "Node failed");
                    self.publish(WorkflowEvent::NodeFailed {
                        node_id,
                        error: e.to_string(),
                    });
                    if first_error.is_none() {
                        abort.cancel();
                        first_error = Some(e);
                    }
                    continue;
                }
            };

            if first_error.is_some() {
                debug!(node = %node_id, "Discarding result of node finished after failure");
                continue;
            }

            let mut keys: Vec<String> = update.keys().cloned().collect();
            keys.sort();
            state.merge(update);
            debug!(node = %node_id, ?keys, elapsed_ms, "Merged node update");
            self.publish(WorkflowEvent::NodeCompleted {
                node_id: node_id.clone(),
                keys: keys.clone(),
                elapsed_ms,
            });
            node_results.push(NodeResult {
                node_id,
                keys,
                elapsed_ms,
            });

            for &s in graph.successor_indices(i) {
                remaining[s] -= 1;
                if remaining[s] == 0 {
                    if let Err(e) = self.launch(graph, s, &state, &abort, &mut running) {
                        abort.cancel();
                        first_error = Some(e);
                        break;
                    }
                }
            }
        }

        let total_elapsed_ms = start.elapsed().as_millis() as u64;
        self.publish(WorkflowEvent::RunFinished {
            succeeded: first_error.is_none(),
            elapsed_ms: total_elapsed_ms,
        });

        if let Some(e) = first_error {
            error!(error = %e, total_elapsed_ms, "Workflow run failed");
            return Err(e);
        }

        info!(
            nodes = node_results.len(),
            total_elapsed_ms, "Workflow run completed"
        );

        Ok(ExecutionResult {
            state,
            node_results,
            total_elapsed_ms,
        })
    }

    /// Validate inputs against the current state and spawn the node.
    fn launch(
        &self,
        graph: &WorkflowGraph,
        i: usize,
        state: &WorkflowState,
        abort: &CancellationToken,
        running: &mut FuturesUnordered<BoxFuture<'static, Finished>>,
    ) -> Result<()> {
        let node = graph.node_at(i).clone();
        let input = match node.prepare_input(state) {
            Ok(input) => input,
            Err(e) => {
                error!(node = %node.id, error = %e, "Node input validation failed");
                self.publish(WorkflowEvent::NodeFailed {
                    node_id: node.id.clone(),
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        debug!(node = %node.id, "Launching node");
        self.publish(WorkflowEvent::NodeStarted {
            node_id: node.id.clone(),
        });

        let handle = tokio::spawn(with_abort(abort.clone(), async move {
            let started = Instant::now();
            let outcome = node.invoke(input).await;
            (started.elapsed().as_millis() as u64, outcome)
        }));

        running.push(Box::pin(async move {
            match handle.await {
                Ok((elapsed_ms, outcome)) => (i, elapsed_ms, outcome),
                Err(e) => (
                    i,
                    0,
                    Err(CaseGraphError::Fatal(format!("node task aborted: {e}"))),
                ),
            }
        }));
        Ok(())
    }

    fn publish(&self, event: WorkflowEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }
}

/// A compiled graph paired with an executor. Cheap to clone and safe to
/// invoke concurrently; each invocation has its own state.
#[derive(Clone)]
pub struct Workflow {
    graph: Arc<WorkflowGraph>,
    events: Option<Arc<EventBus>>,
}

impl Workflow {
    pub fn new(graph: WorkflowGraph) -> Self {
        Self {
            graph: Arc::new(graph),
            events: None,
        }
    }

    pub fn with_events(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    /// Run to completion and return the final state.
    pub async fn invoke(&self, initial: WorkflowState) -> Result<WorkflowState> {
        Ok(self.execute(initial).await?.state)
    }

    /// Run to completion and return state plus per-node timings.
    pub async fn execute(&self, initial: WorkflowState) -> Result<ExecutionResult> {
        let mut executor = Executor::new();
        if let Some(bus) = &self.events {
            executor = executor.with_events(bus.clone());
        }
        executor.run(&self.graph, initial).await
    }
}
