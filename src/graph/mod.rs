//! Read-only graph structure shared by every run of a workflow.

mod builder;
mod types;

pub use builder::build_graph;
pub use types::WorkflowGraph;
