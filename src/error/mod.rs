//! Error types for the workflow engine.
//!
//! - [`StepError`] — Errors raised while executing a single step.
//! - [`EngineError`] — Top-level errors for loading, traversing, and running a workflow.
//!
//! Every variant maps to a stable, machine-readable code surfaced in run
//! records and HTTP responses.

pub mod engine_error;
pub mod step_error;

pub use engine_error::EngineError;
pub use step_error::StepError;

/// Convenience alias for run-level results.
pub type EngineResult<T> = Result<T, EngineError>;
/// Convenience alias for step-level results.
pub type StepResult<T> = Result<T, StepError>;
