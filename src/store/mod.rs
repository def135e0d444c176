//! Persistence contract for workflows, graphs, runs, and credentials.
//!
//! Every operation is a short, independent acquisition — the engine never
//! holds store resources across step boundaries. Implementations must be safe
//! for concurrent callers from different runs.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{
    Credential, Edge, Step, StepExecution, Workflow, WorkflowExecution,
};
use crate::model::workflow::WorkflowUpdate;

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("backend error: {0}")]
    Backend(String),
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound(e.to_string()),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync {
    // Workflows
    async fn get_workflow(&self, id: &str) -> StoreResult<Option<Workflow>>;
    async fn list_workflows(&self) -> StoreResult<Vec<Workflow>>;
    async fn create_workflow(&self, workflow: Workflow) -> StoreResult<Workflow>;
    async fn update_workflow(
        &self,
        id: &str,
        update: WorkflowUpdate,
    ) -> StoreResult<Option<Workflow>>;
    /// Cascades to steps, edges, and runs.
    async fn delete_workflow(&self, id: &str) -> StoreResult<bool>;

    // Graph
    /// Steps in stable `(order, id)` order.
    async fn get_steps(&self, workflow_id: &str) -> StoreResult<Vec<Step>>;
    async fn get_edges(&self, workflow_id: &str) -> StoreResult<Vec<Edge>>;
    /// Atomically replace the workflow's step and edge sets (edges cleared
    /// before steps to satisfy foreign keys).
    async fn replace_graph(
        &self,
        workflow_id: &str,
        steps: Vec<Step>,
        edges: Vec<Edge>,
    ) -> StoreResult<()>;

    // Runs
    async fn create_execution(&self, execution: WorkflowExecution) -> StoreResult<()>;
    async fn update_execution(&self, execution: &WorkflowExecution) -> StoreResult<()>;
    async fn get_execution(&self, id: &str) -> StoreResult<Option<WorkflowExecution>>;
    /// Newest first.
    async fn list_executions(&self, workflow_id: &str) -> StoreResult<Vec<WorkflowExecution>>;

    // Step runs
    async fn create_step_execution(&self, record: StepExecution) -> StoreResult<()>;
    async fn update_step_execution(&self, record: &StepExecution) -> StoreResult<()>;
    async fn list_step_executions(&self, execution_id: &str) -> StoreResult<Vec<StepExecution>>;

    // Credentials
    async fn list_credentials(&self) -> StoreResult<Vec<Credential>>;
    async fn create_credential(&self, credential: Credential) -> StoreResult<Credential>;
    async fn delete_credential(&self, id: &str) -> StoreResult<bool>;
}
