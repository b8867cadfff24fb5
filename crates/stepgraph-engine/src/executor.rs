use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use stepgraph_core::error::{FlowError, Result};
use stepgraph_core::event::EventBus;
use stepgraph_core::graph::Graph;
use stepgraph_core::run::{Run, RunSummary, StepLogEntry};
use stepgraph_core::state::State;
use stepgraph_core::traits::RunStore;
use stepgraph_core::types::{FlowEvent, StepEvent};
use stepgraph_tools::ToolRegistry;

/// Executes graphs one step at a time.
///
/// Starting from `graph.start_node`, each step resolves the node, runs its
/// tool against the live run state, merges the returned update, appends a
/// log entry, persists the run, and publishes a step event. The next node is
/// the tool's override if it named one, else the node's static successor.
///
/// The executor never returns an error: lookup and tool failures end the
/// run as FAILED, and store or event failures are only logged.
#[derive(Clone)]
pub struct GraphExecutor {
    registry: Arc<ToolRegistry>,
    runs: Arc<dyn RunStore>,
    event_bus: Arc<EventBus>,
    cancel: CancellationToken,
}

impl GraphExecutor {
    pub fn new(
        registry: Arc<ToolRegistry>,
        runs: Arc<dyn RunStore>,
        event_bus: Arc<EventBus>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            registry,
            runs,
            event_bus,
            cancel,
        }
    }

    /// Token that aborts runs started by this executor.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run `graph` to a terminal status and return its summary.
    pub async fn execute(&self, graph: &Graph, initial_state: State) -> RunSummary {
        self.execute_run(graph, Run::new(graph.id.clone(), initial_state)).await
    }

    /// Drive an already-created RUNNING record to a terminal status.
    pub async fn execute_run(&self, graph: &Graph, mut run: Run) -> RunSummary {
        let start = Instant::now();

        info!(
            run_id = %run.id,
            graph_id = %graph.id,
            start_node = %graph.start_node,
            max_steps = graph.max_steps,
            "Run started"
        );
        self.persist(&run).await;
        self.event_bus.publish(FlowEvent::RunStarted {
            run_id: run.id.clone(),
            graph_id: graph.id.clone(),
        });

        match self.step_loop(graph, &mut run).await {
            Ok(()) => run.complete(),
            Err(e) => {
                error!(run_id = %run.id, error = %e, steps = run.steps(), "Run failed");
                run.fail(e.to_string());
            }
        }

        self.persist(&run).await;
        self.event_bus.publish(match &run.error {
            Some(error) => FlowEvent::RunFailed {
                run_id: run.id.clone(),
                error: error.clone(),
            },
            None => FlowEvent::RunCompleted {
                run_id: run.id.clone(),
                steps: run.steps(),
            },
        });

        info!(
            run_id = %run.id,
            status = %run.status,
            steps = run.steps(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Run finished"
        );
        run.summary()
    }

    async fn step_loop(&self, graph: &Graph, run: &mut Run) -> Result<()> {
        let mut current = Some(graph.start_node.clone());

        while let Some(node_id) = current.take() {
            if run.steps() >= graph.max_steps {
                warn!(
                    run_id = %run.id,
                    pending_node = %node_id,
                    max_steps = graph.max_steps,
                    "Step budget exhausted, completing run"
                );
                break;
            }
            if self.cancel.is_cancelled() {
                return Err(FlowError::Cancelled);
            }

            let node = graph
                .node(&node_id)
                .ok_or_else(|| FlowError::NodeNotFound(node_id.clone()))?;

            debug!(run_id = %run.id, node_id = %node.id, tool = %node.tool, "Executing node");
            let started_at = Utc::now();
            let output = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(FlowError::Cancelled),
                result = self.registry.execute(&node.tool, &run.state) => result?,
            };

            if !run.state.merge_value(&output.update) && !output.update.is_null() {
                debug!(node_id = %node.id, "Discarding non-object tool update");
            }

            let step = run.steps() + 1;
            run.logs.push(StepLogEntry {
                step,
                node_id: node.id.clone(),
                tool: node.tool.clone(),
                started_at,
                finished_at: Utc::now(),
                state_snapshot: run.state.clone(),
                message: format!("Executed node '{}'", node.id),
            });
            run.updated_at = Utc::now();

            self.persist(run).await;
            self.event_bus.publish(FlowEvent::StepCompleted(StepEvent {
                run_id: run.id.clone(),
                step,
                node: node.id.clone(),
                tool: node.tool.clone(),
                state: run.state.clone(),
            }));

            current = match output.next_node() {
                Some(target) => {
                    debug!(node_id = %node.id, next = %target, "Tool redirected execution");
                    Some(target.to_string())
                }
                None => node.next.clone(),
            };
        }

        Ok(())
    }

    async fn persist(&self, run: &Run) {
        if let Err(e) = self.runs.put_run(run).await {
            warn!(run_id = %run.id, error = %e, "Failed to persist run snapshot");
        }
    }
}
