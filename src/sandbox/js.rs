use std::sync::OnceLock;
use std::time::Duration;

use boa_engine::{Context, Source};
use regex::Regex;
use serde_json::Value;

use crate::error::{StepError, StepResult};

/// Values exposed to user code.
#[derive(Debug, Clone)]
pub struct Bindings {
    /// The step's inputs view (`_all`, predecessor entries, `currentItem`).
    pub inputs: Value,
    /// `{ "outputs": <run outputs snapshot> }`.
    pub context: Value,
}

/// Sandboxed expression and code evaluator.
#[derive(Debug, Clone)]
pub struct Sandbox {
    timeout: Duration,
}

fn return_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\breturn\b").unwrap())
}

/// Escape a compact JSON document for embedding in a single-quoted JS string.
fn escape_json(json: &str) -> String {
    json.replace('\\', "\\\\").replace('\'', "\\'")
}

impl Sandbox {
    pub fn new(timeout: Duration) -> Self {
        Sandbox { timeout }
    }

    /// Evaluate a value expression, e.g. `context.outputs[id].value`.
    pub async fn eval_expr(&self, expr: &str, bindings: &Bindings) -> StepResult<Value> {
        let body = format!("return ({});", expr);
        self.run(self.build_script(&body, bindings, None)?).await
    }

    /// Evaluate a boolean expression with JS truthiness.
    pub async fn eval_bool(&self, expr: &str, bindings: &Bindings) -> StepResult<bool> {
        let body = format!("return !!({});", expr);
        let value = self.run(self.build_script(&body, bindings, None)?).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    /// Execute a code body and return its final value. Bodies containing a
    /// top-level `return` run as a function body; anything else is treated as
    /// a single expression.
    pub async fn eval_code(&self, code: &str, bindings: &Bindings) -> StepResult<Value> {
        let body = if return_re().is_match(code) {
            code.to_string()
        } else {
            format!("return ({});", code)
        };
        self.run(self.build_script(&body, bindings, None)?).await
    }

    /// Apply a `(item, index, array)` predicate expression to an array.
    pub async fn filter_array(
        &self,
        predicate: &str,
        items: &[Value],
        bindings: &Bindings,
    ) -> StepResult<Vec<Value>> {
        let body = format!(
            "return __items.filter(function(item, index, array) {{ return !!({}); }});",
            predicate
        );
        let items_json = serde_json::to_string(items)
            .map_err(|e| StepError::SandboxError(e.to_string()))?;
        let value = self
            .run(self.build_script(&body, bindings, Some(&items_json))?)
            .await?;
        match value {
            Value::Array(filtered) => Ok(filtered),
            other => Err(StepError::SandboxError(format!(
                "filter predicate produced non-array result: {}",
                other
            ))),
        }
    }

    fn build_script(
        &self,
        body: &str,
        bindings: &Bindings,
        items_json: Option<&str>,
    ) -> StepResult<String> {
        let inputs_json = serde_json::to_string(&bindings.inputs)
            .map_err(|e| StepError::SandboxError(e.to_string()))?;
        let context_json = serde_json::to_string(&bindings.context)
            .map_err(|e| StepError::SandboxError(e.to_string()))?;
        let items_decl = match items_json {
            Some(json) => format!("var __items = JSON.parse('{}');", escape_json(json)),
            None => String::new(),
        };

        Ok(format!(
            r#"
(function() {{
    var __inputs = JSON.parse('{inputs}');
    var __context = JSON.parse('{context}');
    {items_decl}
    var __result = (function(inputs, context, currentItem) {{
{body}
    }})(__inputs, __context, __inputs.currentItem);
    if (__result === undefined) {{ __result = null; }}
    return JSON.stringify({{ "__output": __result }});
}})();
"#,
            inputs = escape_json(&inputs_json),
            context = escape_json(&context_json),
            items_decl = items_decl,
            body = body,
        ))
    }

    async fn run(&self, script: String) -> StepResult<Value> {
        let handle = tokio::task::spawn_blocking(move || -> Result<Value, String> {
            let mut context = Context::default();
            // Interpreter-level bounds so a runaway body cannot pin the
            // blocking thread past runtime shutdown; the wall-clock budget
            // below is the observable limit.
            context.runtime_limits_mut().set_loop_iteration_limit(1_000_000);
            context.runtime_limits_mut().set_recursion_limit(512);
            let completion = context
                .eval(Source::from_bytes(&script))
                .map_err(|e| e.to_string())?;
            let json_text = completion
                .as_string()
                .map(|s| s.to_std_string_escaped())
                .ok_or_else(|| "evaluation produced a non-serializable value".to_string())?;
            let wrapper: Value =
                serde_json::from_str(&json_text).map_err(|e| e.to_string())?;
            Ok(wrapper.get("__output").cloned().unwrap_or(Value::Null))
        });

        match tokio::time::timeout(self.timeout, handle).await {
            Err(_) => Err(StepError::SandboxTimeout),
            Ok(Err(join_err)) => Err(StepError::SandboxError(join_err.to_string())),
            Ok(Ok(Err(message))) => {
                if message.contains("iteration limit") || message.contains("recursion limit") {
                    Err(StepError::SandboxTimeout)
                } else {
                    Err(StepError::SandboxError(message))
                }
            }
            Ok(Ok(Ok(value))) => Ok(value),
        }
    }
}

impl Default for Sandbox {
    fn default() -> Self {
        Sandbox::new(Duration::from_millis(5000))
    }
}
