//! Trigger step handler.
//!
//! The engine seeds the trigger step's output from the admitting envelope
//! before traversal begins; when the step itself is dispatched the handler is
//! a pass-through that keeps whatever was seeded (or a bare marker when the
//! step was not the admitting trigger).

use async_trait::async_trait;
use serde_json::json;

use crate::engine::StepContext;
use crate::error::StepResult;
use crate::model::Step;

use super::{StepHandler, StepOutcome};

pub struct TriggerHandler;

#[async_trait]
impl StepHandler for TriggerHandler {
    async fn run(&self, step: &Step, ctx: &StepContext) -> StepResult<StepOutcome> {
        let seeded = ctx.outputs.get(&step.id).cloned();
        Ok(StepOutcome::value(
            seeded.unwrap_or_else(|| json!({ "triggered": true })),
        ))
    }
}
