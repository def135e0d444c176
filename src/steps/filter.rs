//! Filter step handler — applies a `(item, index, array)` predicate to a
//! resolved array input.

use async_trait::async_trait;
use serde_json::Value;

use crate::engine::StepContext;
use crate::error::{StepError, StepResult};
use crate::model::Step;

use super::{StepHandler, StepOutcome};

pub struct FilterHandler;

#[async_trait]
impl StepHandler for FilterHandler {
    async fn run(&self, step: &Step, ctx: &StepContext) -> StepResult<StepOutcome> {
        let path = step
            .config_str("input")
            .ok_or_else(|| StepError::ConfigError("filter step requires an input path".into()))?;
        let predicate = step
            .config_str("predicate")
            .ok_or_else(|| StepError::ConfigError("filter step requires a predicate".into()))?;

        let value = ctx.resolve_input(path).unwrap_or(Value::Null);
        let items = match value {
            Value::Array(items) => items,
            other => {
                return Err(StepError::TypeError(format!(
                    "filter input '{path}' is not an array (got {other})"
                )))
            }
        };

        let filtered = ctx
            .sandbox
            .filter_array(predicate, &items, &ctx.bindings())
            .await?;
        Ok(StepOutcome::value(Value::Array(filtered)))
    }
}
