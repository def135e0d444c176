//! Merge step handler — combines an ordered list of resolved paths into one
//! object. A dotted path assigns under its last segment; a bare path
//! shallow-merges object values. Later entries win.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::engine::StepContext;
use crate::error::{StepError, StepResult};
use crate::model::Step;

use super::{StepHandler, StepOutcome};

pub struct MergeHandler;

#[async_trait]
impl StepHandler for MergeHandler {
    async fn run(&self, step: &Step, ctx: &StepContext) -> StepResult<StepOutcome> {
        let paths: Vec<String> = step
            .config
            .get("inputs")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .ok_or_else(|| {
                StepError::ConfigError("merge step requires an inputs list of paths".into())
            })?;

        let mut merged = Map::new();
        for path in &paths {
            let Some(value) = ctx.resolve_input(path) else {
                continue;
            };
            let trimmed = path.trim_start_matches('$');
            if let Some((_, last)) = trimmed.rsplit_once('.') {
                merged.insert(last.to_string(), value);
            } else {
                match value {
                    Value::Object(fields) => {
                        for (key, field) in fields {
                            merged.insert(key, field);
                        }
                    }
                    other => {
                        merged.insert(trimmed.to_string(), other);
                    }
                }
            }
        }

        Ok(StepOutcome::value(Value::Object(merged)))
    }
}
