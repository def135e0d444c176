//! LLM provider capability: a single `complete` call plus a deterministic
//! mock mode used whenever no credential is configured.

pub mod anthropic;
pub mod mock;
pub mod router;

use async_trait::async_trait;
use thiserror::Error;

pub use anthropic::{AnthropicConfig, AnthropicProvider};
pub use mock::MockProvider;
pub use router::LlmRouter;

/// Default model used when a step's config does not name one.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Request for a single text completion.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Provider returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),
}

impl From<LlmError> for crate::error::StepError {
    fn from(e: LlmError) -> Self {
        crate::error::StepError::LlmError(e.to_string())
    }
}

/// Text-completion capability. Implementations must be safe for concurrent
/// callers from different runs.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError>;
}
