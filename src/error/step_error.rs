use thiserror::Error;

/// Step-level errors
#[derive(Debug, Error)]
pub enum StepError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Type error: {0}")]
    TypeError(String),
    #[error("Template error: {0}")]
    TemplateError(String),
    #[error("Sandbox error: {0}")]
    SandboxError(String),
    #[error("Sandbox timeout: evaluation exceeded time limit")]
    SandboxTimeout,
    #[error("LLM error: {0}")]
    LlmError(String),
    #[error("Execution error: {0}")]
    ExecutionError(String),
    #[error("Run cancelled")]
    Cancelled,
    #[error("Run deadline exceeded")]
    DeadlineExceeded,
}

impl StepError {
    /// Stable error code recorded on the failed step run.
    pub fn code(&self) -> &'static str {
        match self {
            StepError::ConfigError(_) => "CONFIG_ERROR",
            StepError::TypeError(_) => "TYPE_ERROR",
            StepError::TemplateError(_) => "TEMPLATE_ERROR",
            StepError::SandboxError(_) => "SANDBOX_ERROR",
            StepError::SandboxTimeout => "SANDBOX_TIMEOUT",
            StepError::LlmError(_) => "LLM_ERROR",
            StepError::ExecutionError(_) => "EXECUTION_ERROR",
            StepError::Cancelled => "CANCELLED",
            StepError::DeadlineExceeded => "DEADLINE_EXCEEDED",
        }
    }

    /// Message with the stable code prefixed, as persisted on records.
    pub fn coded_message(&self) -> String {
        format!("{}: {}", self.code(), self)
    }
}

impl From<serde_json::Error> for StepError {
    fn from(e: serde_json::Error) -> Self {
        StepError::TypeError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_error_codes() {
        assert_eq!(StepError::TypeError("x".into()).code(), "TYPE_ERROR");
        assert_eq!(StepError::SandboxTimeout.code(), "SANDBOX_TIMEOUT");
        assert_eq!(StepError::SandboxError("e".into()).code(), "SANDBOX_ERROR");
        assert_eq!(StepError::LlmError("e".into()).code(), "LLM_ERROR");
        assert_eq!(StepError::Cancelled.code(), "CANCELLED");
    }

    #[test]
    fn test_coded_message_contains_code_and_detail() {
        let msg = StepError::TypeError("loop input is not an array".into()).coded_message();
        assert!(msg.starts_with("TYPE_ERROR"));
        assert!(msg.contains("loop input is not an array"));
    }
}
