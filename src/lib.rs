pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod graph;
pub mod llm;
pub mod model;
pub mod sandbox;
pub mod steps;
pub mod store;
pub mod template;

pub use crate::config::AppConfig;
pub use crate::engine::{Engine, EngineConfig, RunSignal, StepContext};
pub use crate::error::{EngineError, StepError};
pub use crate::gateway::{router, AppState};
pub use crate::graph::{build_graph, WorkflowGraph};
pub use crate::llm::{
    AnthropicProvider, CompletionRequest, LlmProvider, LlmRouter, MockProvider,
};
pub use crate::model::{
    Credential, Edge, ExecutionStatus, Step, StepExecution, StepKind, StepStatus,
    TriggerEnvelope, Workflow, WorkflowExecution,
};
pub use crate::sandbox::Sandbox;
pub use crate::steps::{HandlerRegistry, StepHandler, StepOutcome};
pub use crate::store::{MemoryStore, Store, StoreError};
#[cfg(feature = "postgres")]
pub use crate::store::PgStore;
pub use crate::template::{resolve_path, resolve_template};
