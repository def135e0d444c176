use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Terminal-or-running status of a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
}

/// Status of one step dispatch within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// One execution of a workflow, from trigger to terminal status.
///
/// `outputs` maps step id to the value that step committed; within a run it is
/// append-only except for the loop-scoped `currentItem` key, which never
/// reaches the persisted map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecution {
    pub id: String,
    pub workflow_id: String,
    pub status: ExecutionStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub outputs: HashMap<String, Value>,
}

impl WorkflowExecution {
    pub fn new(workflow_id: impl Into<String>) -> Self {
        WorkflowExecution {
            id: super::new_id(),
            workflow_id: workflow_id.into(),
            status: ExecutionStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            error: None,
            outputs: HashMap::new(),
        }
    }
}

/// One dispatch of one step within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepExecution {
    pub id: String,
    pub workflow_execution_id: String,
    pub step_id: String,
    pub status: StepStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
    /// Snapshot of the inputs view handed to the handler.
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub output: Value,
}

impl StepExecution {
    pub fn started(execution_id: &str, step_id: &str, input: Value) -> Self {
        StepExecution {
            id: super::new_id(),
            workflow_execution_id: execution_id.to_string(),
            step_id: step_id.to_string(),
            status: StepStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            error: None,
            input,
            output: Value::Null,
        }
    }

    pub fn complete(&mut self, output: Value) {
        self.status = StepStatus::Completed;
        self.end_time = Some(Utc::now());
        self.output = output;
    }

    pub fn fail(&mut self, error: String) {
        self.status = StepStatus::Failed;
        self.end_time = Some(Utc::now());
        self.error = Some(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serde() {
        assert_eq!(
            serde_json::to_string(&ExecutionStatus::Running).unwrap(),
            "\"running\""
        );
        assert_eq!(
            serde_json::to_string(&StepStatus::Completed).unwrap(),
            "\"completed\""
        );
    }

    #[test]
    fn test_step_execution_transitions() {
        let mut rec = StepExecution::started("e1", "s1", serde_json::json!({"_all": {}}));
        assert_eq!(rec.status, StepStatus::Running);
        assert!(rec.end_time.is_none());

        rec.complete(serde_json::json!("done"));
        assert_eq!(rec.status, StepStatus::Completed);
        assert!(rec.end_time.is_some());
        assert_eq!(rec.output, serde_json::json!("done"));
    }

    #[test]
    fn test_step_execution_failure() {
        let mut rec = StepExecution::started("e1", "s1", Value::Null);
        rec.fail("TYPE_ERROR: boom".into());
        assert_eq!(rec.status, StepStatus::Failed);
        assert_eq!(rec.error.as_deref(), Some("TYPE_ERROR: boom"));
    }
}
