//! Run-level error types.

use super::StepError;
use thiserror::Error;

/// Run-level errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),
    #[error("Step not found: {0}")]
    StepNotFound(String),
    #[error("Cycle detected: {}", path.join(" -> "))]
    CycleDetected { path: Vec<String> },
    #[error("Branch unresolved: step {step_id} selected '{value}' with no matching or default edge")]
    BranchUnresolved { step_id: String, value: String },
    #[error("Step {step_id} failed: {source}")]
    StepFailed {
        step_id: String,
        #[source]
        source: StepError,
    },
    #[error("Run cancelled")]
    Cancelled,
    #[error("Run deadline exceeded")]
    DeadlineExceeded,
    #[error("Store error: {0}")]
    Store(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Stable error code persisted on the failed run.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::WorkflowNotFound(_) => "WORKFLOW_NOT_FOUND",
            EngineError::StepNotFound(_) => "STEP_NOT_FOUND",
            EngineError::CycleDetected { .. } => "CYCLE_DETECTED",
            EngineError::BranchUnresolved { .. } => "BRANCH_UNRESOLVED",
            EngineError::StepFailed { source, .. } => source.code(),
            EngineError::Cancelled => "CANCELLED",
            EngineError::DeadlineExceeded => "DEADLINE_EXCEEDED",
            EngineError::Store(_) => "STORE_ERROR",
            EngineError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message with the stable code prefixed, as persisted on the run record.
    pub fn coded_message(&self) -> String {
        format!("{}: {}", self.code(), self)
    }
}

impl From<crate::store::StoreError> for EngineError {
    fn from(e: crate::store::StoreError) -> Self {
        EngineError::Store(e.to_string())
    }
}
