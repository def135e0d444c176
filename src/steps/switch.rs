//! Switch step handler — evaluates an expression and follows the outgoing
//! edge whose label equals the stringified value, falling back to the
//! `"default"` edge. With neither, no successor is taken and the run
//! continues (non-fatal).

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use crate::engine::StepContext;
use crate::error::{StepError, StepResult};
use crate::model::Step;

use super::{BranchSelection, StepHandler, StepOutcome};

pub struct SwitchHandler;

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl StepHandler for SwitchHandler {
    async fn run(&self, step: &Step, ctx: &StepContext) -> StepResult<StepOutcome> {
        let expression = step
            .config_str("expression")
            .ok_or_else(|| StepError::ConfigError("switch step requires an expression".into()))?;
        let value = ctx.sandbox.eval_expr(expression, &ctx.bindings()).await?;
        let case = stringify(&value);

        let has_label = |label: &str| {
            ctx.outgoing_labels
                .iter()
                .any(|l| l.as_deref() == Some(label))
        };

        let branch = if has_label(&case) {
            BranchSelection::Take(vec![case.clone()])
        } else if has_label("default") {
            BranchSelection::Take(vec!["default".to_string()])
        } else {
            warn!(
                step_id = %step.id,
                value = %case,
                "BRANCH_UNRESOLVED: switch has no matching or default edge"
            );
            BranchSelection::None
        };

        Ok(StepOutcome {
            output: json!({ "switchValue": case }),
            branch,
        })
    }
}
