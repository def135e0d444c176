//! Condition step handler — evaluates a boolean expression and selects the
//! matching `"true"`/`"false"` outgoing edges. Unselected edges are pruned
//! for this run.

use async_trait::async_trait;
use serde_json::json;

use crate::engine::StepContext;
use crate::error::{StepError, StepResult};
use crate::model::Step;

use super::{StepHandler, StepOutcome};

pub struct ConditionHandler;

#[async_trait]
impl StepHandler for ConditionHandler {
    async fn run(&self, step: &Step, ctx: &StepContext) -> StepResult<StepOutcome> {
        let expression = step
            .config_str("condition")
            .ok_or_else(|| StepError::ConfigError("condition step requires a condition".into()))?;
        let result = ctx.sandbox.eval_bool(expression, &ctx.bindings()).await?;
        Ok(StepOutcome::branched(
            json!({ "condition": result, "result": result }),
            vec![result.to_string()],
        ))
    }
}
