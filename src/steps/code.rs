//! Code step handler — runs the configured body in the sandbox with the
//! `inputs` and `context` bindings and returns the body's final value.

use async_trait::async_trait;

use crate::engine::StepContext;
use crate::error::{StepError, StepResult};
use crate::model::Step;

use super::{StepHandler, StepOutcome};

pub struct CodeHandler;

#[async_trait]
impl StepHandler for CodeHandler {
    async fn run(&self, step: &Step, ctx: &StepContext) -> StepResult<StepOutcome> {
        let code = step
            .config_str("code")
            .ok_or_else(|| StepError::ConfigError("code step requires a code body".into()))?;
        let value = ctx.sandbox.eval_code(code, &ctx.bindings()).await?;
        Ok(StepOutcome::value(value))
    }
}
