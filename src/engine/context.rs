//! Per-run mutable state and the context handed to step handlers.
//!
//! Each run owns a stack of scope frames. Frame 0 is the run scope; loop
//! iterations push an overlay frame that shadows `currentItem` and absorbs
//! every write made inside the iteration, so nothing leaks into the parent
//! scope when the frame is popped.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Map, Value};

use crate::error::{StepError, StepResult};
use crate::llm::LlmProvider;
use crate::sandbox::{Bindings, Sandbox};
use crate::template::resolve_path;

/// Reserved outputs key shadowed by loop iteration frames.
pub const CURRENT_ITEM_KEY: &str = "currentItem";

/// Cancellation flag plus run deadline, checked before each step dispatch and
/// each LLM call.
#[derive(Debug)]
pub struct RunSignal {
    cancelled: AtomicBool,
    deadline: Instant,
}

impl RunSignal {
    pub fn new(timeout: Duration) -> Self {
        RunSignal {
            cancelled: AtomicBool::new(false),
            deadline: Instant::now() + timeout,
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn check(&self) -> StepResult<()> {
        if self.is_cancelled() {
            return Err(StepError::Cancelled);
        }
        if Instant::now() >= self.deadline {
            return Err(StepError::DeadlineExceeded);
        }
        Ok(())
    }
}

/// Traversal state of one edge within a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EdgeState {
    Pending,
    Taken,
    Skipped,
}

#[derive(Debug, Default)]
pub(crate) struct ScopeFrame {
    outputs: HashMap<String, Value>,
    dispatched: HashSet<String>,
    traversed: HashSet<String>,
    skipped: HashSet<String>,
    edges: HashMap<String, EdgeState>,
}

/// Mutable state owned by one run's driver task.
pub(crate) struct RunState {
    pub execution_id: String,
    pub signal: Arc<RunSignal>,
    /// Forward traversal path, for cycle reporting.
    pub path: Vec<String>,
    /// Predecessor resolution path, for cycle reporting.
    pub resolving: Vec<String>,
    scopes: Vec<ScopeFrame>,
}

impl RunState {
    pub fn new(
        execution_id: String,
        signal: Arc<RunSignal>,
        seed: HashMap<String, Value>,
    ) -> Self {
        let root = ScopeFrame {
            outputs: seed,
            ..Default::default()
        };
        RunState {
            execution_id,
            signal,
            path: Vec::new(),
            resolving: Vec::new(),
            scopes: vec![root],
        }
    }

    fn top(&mut self) -> &mut ScopeFrame {
        self.scopes.last_mut().expect("run state always has a root scope")
    }

    pub fn push_frame(&mut self, current_item: Value, taken_edge_ids: &[String]) {
        let mut frame = ScopeFrame::default();
        frame
            .outputs
            .insert(CURRENT_ITEM_KEY.to_string(), current_item);
        for edge_id in taken_edge_ids {
            frame.edges.insert(edge_id.clone(), EdgeState::Taken);
        }
        self.scopes.push(frame);
    }

    pub fn pop_frame(&mut self) {
        debug_assert!(self.scopes.len() > 1, "root scope is never popped");
        self.scopes.pop();
    }

    pub fn output_of(&self, step_id: &str) -> Option<&Value> {
        self.scopes
            .iter()
            .rev()
            .find_map(|frame| frame.outputs.get(step_id))
    }

    pub fn insert_output(&mut self, step_id: &str, value: Value) {
        self.top().outputs.insert(step_id.to_string(), value);
    }

    /// Merged view of the outputs map, innermost scope winning.
    pub fn outputs_snapshot(&self) -> Map<String, Value> {
        let mut merged = Map::new();
        for frame in &self.scopes {
            for (key, value) in &frame.outputs {
                merged.insert(key.clone(), value.clone());
            }
        }
        merged
    }

    /// The run scope's outputs, persisted when the run finalizes.
    pub fn root_outputs(&self) -> HashMap<String, Value> {
        self.scopes[0].outputs.clone()
    }

    pub fn is_dispatched(&self, step_id: &str) -> bool {
        self.scopes.iter().any(|f| f.dispatched.contains(step_id))
    }

    pub fn mark_dispatched(&mut self, step_id: &str) {
        self.top().dispatched.insert(step_id.to_string());
    }

    pub fn is_traversed(&self, step_id: &str) -> bool {
        self.scopes.iter().any(|f| f.traversed.contains(step_id))
    }

    pub fn mark_traversed(&mut self, step_id: &str) {
        self.top().traversed.insert(step_id.to_string());
    }

    pub fn is_skipped(&self, step_id: &str) -> bool {
        self.scopes.iter().any(|f| f.skipped.contains(step_id))
    }

    pub fn mark_skipped(&mut self, step_id: &str) {
        self.top().skipped.insert(step_id.to_string());
    }

    pub fn edge_state(&self, edge_id: &str) -> EdgeState {
        self.scopes
            .iter()
            .rev()
            .find_map(|frame| frame.edges.get(edge_id).copied())
            .unwrap_or(EdgeState::Pending)
    }

    pub fn set_edge_state(&mut self, edge_id: &str, state: EdgeState) {
        self.top().edges.insert(edge_id.to_string(), state);
    }
}

/// Read-only context handed to a step handler. Handlers never touch the store.
pub struct StepContext {
    /// Inputs view: `_all`, one entry per direct predecessor, and
    /// `currentItem` inside loop scopes.
    pub inputs: Value,
    /// Snapshot of the run's outputs map.
    pub outputs: Value,
    /// Labels on the step's outgoing edges, for branch fallback checks.
    pub outgoing_labels: Vec<Option<String>>,
    pub sandbox: Arc<Sandbox>,
    pub llm: Arc<dyn LlmProvider>,
    pub signal: Arc<RunSignal>,
}

impl StepContext {
    /// Sandbox bindings: `inputs` plus `context = { outputs }`.
    pub fn bindings(&self) -> Bindings {
        Bindings {
            inputs: self.inputs.clone(),
            context: json!({ "outputs": self.outputs }),
        }
    }

    /// Resolve a path expression against the inputs view.
    pub fn resolve_input(&self, path: &str) -> Option<Value> {
        resolve_path(path, &self.inputs)
    }

    /// Fails with `CANCELLED`/`DEADLINE_EXCEEDED` when the run signal fired.
    pub fn check_signal(&self) -> StepResult<()> {
        self.signal.check()
    }
}
