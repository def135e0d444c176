//! Shared builders for integration tests: a mock-LLM engine over the memory
//! store, and terse step/edge constructors.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use stepflow::engine::{Engine, EngineConfig};
use stepflow::llm::MockProvider;
use stepflow::model::{Edge, Step, StepKind, Workflow};
use stepflow::store::{MemoryStore, Store};

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub engine: Arc<Engine>,
}

pub fn harness() -> Harness {
    harness_with_config(EngineConfig::default())
}

pub fn harness_with_config(config: EngineConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let llm = Arc::new(MockProvider::with_latency(Duration::from_millis(5)));
    let engine = Arc::new(Engine::new(store.clone(), llm, config));
    Harness { store, engine }
}

pub fn step(workflow_id: &str, id: &str, kind: StepKind, config: Value, order: i32) -> Step {
    Step {
        id: id.into(),
        workflow_id: workflow_id.into(),
        kind,
        label: id.into(),
        position: Value::Null,
        config,
        order,
    }
}

pub fn edge(workflow_id: &str, source: &str, target: &str, label: Option<&str>) -> Edge {
    Edge {
        id: format!("{source}->{target}{}", label.map(|l| format!(":{l}")).unwrap_or_default()),
        workflow_id: workflow_id.into(),
        source_id: source.into(),
        target_id: target.into(),
        label: label.map(String::from),
    }
}

pub async fn seed_workflow(
    store: &MemoryStore,
    name: &str,
    steps: Vec<Step>,
    edges: Vec<Edge>,
) -> Workflow {
    let workflow = store.create_workflow(Workflow::new(name)).await.unwrap();
    let steps = steps
        .into_iter()
        .map(|mut s| {
            s.workflow_id = workflow.id.clone();
            s
        })
        .collect();
    let edges = edges
        .into_iter()
        .map(|mut e| {
            e.workflow_id = workflow.id.clone();
            e
        })
        .collect();
    store.replace_graph(&workflow.id, steps, edges).await.unwrap();
    workflow
}
