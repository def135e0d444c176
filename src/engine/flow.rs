//! Per-run traversal: predecessor resolution, branch pruning, loop
//! iteration, fan-in, and cycle detection.
//!
//! Traversal is two-phase. `resolve_output` recursively produces the outputs
//! of a step's non-pruned predecessors (without walking forward from them),
//! then dispatches the step and marks its outgoing edges taken or skipped.
//! `traverse` walks forward along taken edges only. A step whose incoming
//! edges are all skipped is itself skipped, and the skip cascades.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{EngineError, EngineResult, StepError};
use crate::graph::WorkflowGraph;
use crate::llm::LlmProvider;
use crate::model::{Step, StepExecution, StepKind};
use crate::sandbox::Sandbox;
use crate::steps::{BranchSelection, HandlerRegistry, StepOutcome};
use crate::store::Store;
use crate::template::resolve_path;

use super::context::{EdgeState, RunState, StepContext, CURRENT_ITEM_KEY};

pub(crate) struct FlowController<'a> {
    graph: &'a WorkflowGraph,
    registry: &'a HandlerRegistry,
    store: &'a dyn Store,
    sandbox: Arc<Sandbox>,
    llm: Arc<dyn LlmProvider>,
    state: RunState,
}

impl<'a> FlowController<'a> {
    pub fn new(
        graph: &'a WorkflowGraph,
        registry: &'a HandlerRegistry,
        store: &'a dyn Store,
        sandbox: Arc<Sandbox>,
        llm: Arc<dyn LlmProvider>,
        state: RunState,
    ) -> Self {
        FlowController {
            graph,
            registry,
            store,
            sandbox,
            llm,
            state,
        }
    }

    /// Drive the run from the start set. Returns the run scope's outputs map
    /// alongside the traversal result so the engine can persist partial
    /// progress on failure.
    pub async fn run(mut self) -> (HashMap<String, Value>, EngineResult<()>) {
        let result = self.run_inner().await;
        (self.state.root_outputs(), result)
    }

    async fn run_inner(&mut self) -> EngineResult<()> {
        let graph = self.graph;
        let starts: Vec<String> = graph.start_steps().iter().map(|s| s.id.clone()).collect();
        if starts.is_empty() {
            // Every step has an incoming edge: the whole graph sits on cycles.
            // Walking from the first step surfaces CYCLE_DETECTED with a path.
            if let Some(first) = graph.first_step() {
                let id = first.id.clone();
                self.traverse(id).await?;
            }
            return Ok(());
        }
        for id in starts {
            self.traverse(id).await?;
        }
        Ok(())
    }

    fn check_signal(&self) -> EngineResult<()> {
        match self.state.signal.check() {
            Ok(()) => Ok(()),
            Err(StepError::Cancelled) => Err(EngineError::Cancelled),
            Err(_) => Err(EngineError::DeadlineExceeded),
        }
    }

    /// Forward walk along taken edges.
    fn traverse(&mut self, step_id: String) -> BoxFuture<'_, EngineResult<()>> {
        Box::pin(async move {
            self.check_signal()?;
            if self.state.is_skipped(&step_id) || self.state.is_traversed(&step_id) {
                return Ok(());
            }
            if let Some(pos) = self.state.path.iter().position(|id| id == &step_id) {
                let mut path = self.state.path[pos..].to_vec();
                path.push(step_id);
                return Err(EngineError::CycleDetected { path });
            }

            self.resolve_output(step_id.clone()).await?;
            if self.state.is_skipped(&step_id) {
                return Ok(());
            }
            self.state.mark_traversed(&step_id);
            self.state.path.push(step_id.clone());

            let graph = self.graph;
            let outgoing: Vec<(String, String)> = graph
                .outgoing(&step_id)
                .iter()
                .map(|e| (e.id.clone(), e.target_id.clone()))
                .collect();

            let mut result = Ok(());
            for (edge_id, target_id) in outgoing {
                match self.state.edge_state(&edge_id) {
                    EdgeState::Taken => {
                        if let Err(e) = self.traverse(target_id).await {
                            result = Err(e);
                            break;
                        }
                    }
                    EdgeState::Skipped => {
                        if self.all_incoming_skipped(&target_id) {
                            self.skip_cascade(&target_id);
                        }
                    }
                    EdgeState::Pending => {}
                }
            }
            self.state.path.pop();
            result
        })
    }

    /// Produce a step's output: resolve non-pruned predecessors first, then
    /// dispatch. Does not walk forward from the step.
    fn resolve_output(&mut self, step_id: String) -> BoxFuture<'_, EngineResult<()>> {
        Box::pin(async move {
            if self.state.is_dispatched(&step_id) || self.state.is_skipped(&step_id) {
                return Ok(());
            }
            if let Some(pos) = self.state.resolving.iter().position(|id| id == &step_id) {
                let mut path = self.state.resolving[pos..].to_vec();
                path.push(step_id);
                return Err(EngineError::CycleDetected { path });
            }
            self.state.resolving.push(step_id.clone());

            let graph = self.graph;
            let incoming: Vec<(String, String)> = graph
                .incoming(&step_id)
                .iter()
                .map(|e| (e.id.clone(), e.source_id.clone()))
                .collect();

            let mut result = Ok(());
            for (edge_id, source_id) in &incoming {
                if self.state.edge_state(edge_id) == EdgeState::Skipped {
                    continue;
                }
                if !self.state.is_dispatched(source_id) && !self.state.is_skipped(source_id) {
                    if let Err(e) = self.resolve_output(source_id.clone()).await {
                        result = Err(e);
                        break;
                    }
                }
            }

            if result.is_ok() {
                let pruned = !incoming.is_empty()
                    && incoming
                        .iter()
                        .all(|(edge_id, _)| self.state.edge_state(edge_id) == EdgeState::Skipped);
                result = if pruned {
                    self.skip_cascade(&step_id);
                    Ok(())
                } else {
                    self.dispatch(&step_id).await
                };
            }

            self.state.resolving.pop();
            result
        })
    }

    async fn dispatch(&mut self, step_id: &str) -> EngineResult<()> {
        let step = self
            .graph
            .step(step_id)
            .ok_or_else(|| EngineError::StepNotFound(step_id.to_string()))?
            .clone();

        self.check_signal()?;
        self.state.mark_dispatched(&step.id);

        let inputs = self.build_inputs(&step.id);
        let mut record = StepExecution::started(&self.state.execution_id, &step.id, inputs.clone());
        self.store.create_step_execution(record.clone()).await?;
        debug!(step_id = %step.id, kind = %step.kind, "dispatching step");

        let result: EngineResult<StepOutcome> = if step.kind == StepKind::Loop {
            self.run_loop(&step, &inputs).await.map(|output| StepOutcome {
                output,
                // Body subtrees already ran inside iteration scopes.
                branch: BranchSelection::None,
            })
        } else {
            let registry = self.registry;
            match registry.get(step.kind) {
                Some(handler) => {
                    let ctx = self.step_context(&step, inputs);
                    handler.run(&step, &ctx).await.map_err(|e| EngineError::StepFailed {
                        step_id: step.id.clone(),
                        source: e,
                    })
                }
                None => Err(EngineError::StepFailed {
                    step_id: step.id.clone(),
                    source: StepError::ConfigError(format!(
                        "no handler registered for step kind {}",
                        step.kind
                    )),
                }),
            }
        };

        match result {
            Ok(outcome) => {
                self.state.insert_output(&step.id, outcome.output.clone());
                record.complete(outcome.output);
                self.store.update_step_execution(&record).await?;
                self.apply_branch(&step.id, &outcome.branch);
                Ok(())
            }
            Err(e) => {
                let message = match &e {
                    EngineError::StepFailed { step_id: failed, source } if failed == &step.id => {
                        source.coded_message()
                    }
                    other => other.coded_message(),
                };
                record.fail(message);
                self.store.update_step_execution(&record).await?;
                Err(e)
            }
        }
    }

    /// Run each outgoing-edge subtree once per item, inside a scoped overlay
    /// where `currentItem` shadows the parent map. The loop's output is an
    /// array of arrays: outer index = item, inner index = successor.
    async fn run_loop(&mut self, step: &Step, inputs: &Value) -> EngineResult<Value> {
        let fail = |source: StepError| EngineError::StepFailed {
            step_id: step.id.clone(),
            source,
        };

        let path = step
            .config_str("input")
            .ok_or_else(|| fail(StepError::ConfigError("loop step requires an input path".into())))?;
        let items = match resolve_path(path, inputs).unwrap_or(Value::Null) {
            Value::Array(items) => items,
            other => {
                return Err(fail(StepError::TypeError(format!(
                    "loop input '{path}' is not an array (got {other})"
                ))))
            }
        };

        let successors: Vec<(String, String)> = self
            .graph
            .outgoing(&step.id)
            .iter()
            .map(|e| (e.id.clone(), e.target_id.clone()))
            .collect();
        let edge_ids: Vec<String> = successors.iter().map(|(id, _)| id.clone()).collect();

        // The loop stays on the forward path while its body runs, so a body
        // edge cycling back surfaces CYCLE_DETECTED.
        self.state.path.push(step.id.clone());
        let mut results = Vec::with_capacity(items.len());
        for item in items {
            self.state.push_frame(item, &edge_ids);
            let mut per_successor = Vec::with_capacity(successors.len());
            let mut failure = None;
            for (_, target_id) in &successors {
                if let Err(e) = self.traverse(target_id.clone()).await {
                    failure = Some(e);
                    break;
                }
                per_successor.push(self.state.output_of(target_id).cloned().unwrap_or(Value::Null));
            }
            self.state.pop_frame();
            if let Some(e) = failure {
                self.state.path.pop();
                return Err(e);
            }
            results.push(Value::Array(per_successor));
        }
        self.state.path.pop();
        Ok(Value::Array(results))
    }

    fn apply_branch(&mut self, step_id: &str, branch: &BranchSelection) {
        let graph = self.graph;
        for edge in graph.outgoing(step_id) {
            let state = match branch {
                BranchSelection::All => EdgeState::Taken,
                BranchSelection::Take(labels) => {
                    let selected = edge
                        .label
                        .as_ref()
                        .map(|label| labels.contains(label))
                        .unwrap_or(false);
                    if selected {
                        EdgeState::Taken
                    } else {
                        EdgeState::Skipped
                    }
                }
                BranchSelection::None => EdgeState::Skipped,
            };
            self.state.set_edge_state(&edge.id, state);
        }
    }

    fn all_incoming_skipped(&self, step_id: &str) -> bool {
        let incoming = self.graph.incoming(step_id);
        !incoming.is_empty()
            && incoming
                .iter()
                .all(|e| self.state.edge_state(&e.id) == EdgeState::Skipped)
    }

    /// Mark a step skipped and propagate through its outgoing edges.
    fn skip_cascade(&mut self, step_id: &str) {
        if self.state.is_skipped(step_id) || self.state.is_dispatched(step_id) {
            return;
        }
        self.state.mark_skipped(step_id);
        debug!(step_id, "step pruned for this run");
        let graph = self.graph;
        let outgoing: Vec<(String, String)> = graph
            .outgoing(step_id)
            .iter()
            .map(|e| (e.id.clone(), e.target_id.clone()))
            .collect();
        for (edge_id, target_id) in outgoing {
            self.state.set_edge_state(&edge_id, EdgeState::Skipped);
            if self.all_incoming_skipped(&target_id) {
                self.skip_cascade(&target_id);
            }
        }
    }

    /// Inputs view: `_all`, one entry per direct predecessor with an output,
    /// and `currentItem` inside loop scopes.
    fn build_inputs(&self, step_id: &str) -> Value {
        let mut view = Map::new();
        for edge in self.graph.incoming(step_id) {
            if let Some(value) = self.state.output_of(&edge.source_id) {
                view.insert(edge.source_id.clone(), value.clone());
            }
        }
        if let Some(item) = self.state.output_of(CURRENT_ITEM_KEY) {
            view.insert(CURRENT_ITEM_KEY.to_string(), item.clone());
        }
        view.insert("_all".to_string(), Value::Object(self.state.outputs_snapshot()));
        Value::Object(view)
    }

    fn step_context(&self, step: &Step, inputs: Value) -> StepContext {
        StepContext {
            inputs,
            outputs: Value::Object(self.state.outputs_snapshot()),
            outgoing_labels: self.graph.outgoing_labels(&step.id),
            sandbox: self.sandbox.clone(),
            llm: self.llm.clone(),
            signal: self.state.signal.clone(),
        }
    }
}
