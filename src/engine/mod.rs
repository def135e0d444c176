//! Run orchestrator: creates a run, drives the flow controller to a terminal
//! status, and surfaces errors on the run record.

mod context;
mod flow;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, instrument, warn};

pub use context::{RunSignal, StepContext, CURRENT_ITEM_KEY};

use crate::error::{EngineError, EngineResult};
use crate::graph::{build_graph, WorkflowGraph};
use crate::llm::LlmProvider;
use crate::model::{ExecutionStatus, TriggerEnvelope, WorkflowExecution};
use crate::sandbox::Sandbox;
use crate::steps::HandlerRegistry;
use crate::store::Store;

use self::context::RunState;
use self::flow::FlowController;

/// Engine-wide limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Run-level deadline in seconds.
    pub run_timeout_secs: u64,
    /// Wall-clock budget for one sandbox call, in milliseconds.
    pub sandbox_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            run_timeout_secs: 600,
            sandbox_timeout_ms: 5000,
        }
    }
}

pub struct Engine {
    store: Arc<dyn Store>,
    llm: Arc<dyn LlmProvider>,
    sandbox: Arc<Sandbox>,
    registry: Arc<HandlerRegistry>,
    config: EngineConfig,
    /// Cancellation signals of in-flight runs.
    signals: DashMap<String, Arc<RunSignal>>,
}

struct PreparedRun {
    graph: WorkflowGraph,
    execution: WorkflowExecution,
    seed: HashMap<String, Value>,
    signal: Arc<RunSignal>,
}

impl Engine {
    pub fn new(store: Arc<dyn Store>, llm: Arc<dyn LlmProvider>, config: EngineConfig) -> Self {
        let sandbox = Arc::new(Sandbox::new(Duration::from_millis(config.sandbox_timeout_ms)));
        Engine {
            store,
            llm,
            sandbox,
            registry: Arc::new(HandlerRegistry::with_builtins()),
            config,
            signals: DashMap::new(),
        }
    }

    /// Start a run and drive it to its terminal status before returning.
    #[instrument(skip(self, envelope))]
    pub async fn start_run(
        &self,
        workflow_id: &str,
        envelope: TriggerEnvelope,
    ) -> EngineResult<WorkflowExecution> {
        let prepared = self.prepare(workflow_id, envelope).await?;
        Ok(self.drive(prepared).await)
    }

    /// Create the run record, then drive the run on its own task. Returns the
    /// run id immediately (used by the webhook, event, and chain paths).
    pub async fn spawn_run(
        self: Arc<Self>,
        workflow_id: &str,
        envelope: TriggerEnvelope,
    ) -> EngineResult<String> {
        let prepared = self.prepare(workflow_id, envelope).await?;
        let execution_id = prepared.execution.id.clone();
        tokio::spawn(async move {
            self.drive(prepared).await;
        });
        Ok(execution_id)
    }

    /// Trip an in-flight run's cancellation signal.
    pub fn cancel(&self, execution_id: &str) -> bool {
        match self.signals.get(execution_id) {
            Some(signal) => {
                signal.cancel();
                true
            }
            None => false,
        }
    }

    async fn prepare(
        &self,
        workflow_id: &str,
        envelope: TriggerEnvelope,
    ) -> EngineResult<PreparedRun> {
        let workflow = self
            .store
            .get_workflow(workflow_id)
            .await?
            .ok_or_else(|| EngineError::WorkflowNotFound(workflow_id.to_string()))?;
        let steps = self.store.get_steps(workflow_id).await?;
        let edges = self.store.get_edges(workflow_id).await?;
        let graph = build_graph(&steps, &edges)?;

        let mut seed: HashMap<String, Value> = HashMap::new();
        if let Some(carried) = envelope.carried_outputs() {
            seed.extend(carried.clone());
        }
        if let Some(trigger_step) = steps.iter().find(|s| envelope.matches_step(s)) {
            seed.insert(trigger_step.id.clone(), envelope.seed_value());
        }

        let execution = WorkflowExecution::new(&workflow.id);
        self.store.create_execution(execution.clone()).await?;

        let signal = Arc::new(RunSignal::new(Duration::from_secs(
            self.config.run_timeout_secs,
        )));
        self.signals.insert(execution.id.clone(), signal.clone());

        info!(
            workflow_id = %workflow.id,
            execution_id = %execution.id,
            trigger = envelope.trigger_type(),
            "run started"
        );

        Ok(PreparedRun {
            graph,
            execution,
            seed,
            signal,
        })
    }

    async fn drive(&self, prepared: PreparedRun) -> WorkflowExecution {
        let PreparedRun {
            graph,
            mut execution,
            seed,
            signal,
        } = prepared;

        let state = RunState::new(execution.id.clone(), signal, seed);
        let controller = FlowController::new(
            &graph,
            &self.registry,
            self.store.as_ref(),
            self.sandbox.clone(),
            self.llm.clone(),
            state,
        );
        let (outputs, result) = controller.run().await;

        execution.outputs = outputs;
        execution.end_time = Some(chrono::Utc::now());
        match result {
            Ok(()) => {
                execution.status = ExecutionStatus::Completed;
                info!(execution_id = %execution.id, "run completed");
            }
            Err(e) => {
                execution.status = ExecutionStatus::Failed;
                execution.error = Some(e.coded_message());
                warn!(execution_id = %execution.id, error = %e, "run failed");
            }
        }

        if let Err(e) = self.store.update_execution(&execution).await {
            error!(execution_id = %execution.id, error = %e, "failed to persist run outcome");
        }
        self.signals.remove(&execution.id);
        execution
    }
}
