//! AI step handlers. Each one shapes a prompt from the step's config and the
//! inputs view, calls the LLM capability, and post-processes the response.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};

use crate::engine::StepContext;
use crate::error::{StepError, StepResult};
use crate::llm::{CompletionRequest, DEFAULT_MODEL};
use crate::model::Step;
use crate::template::{resolve_template, value_to_display};

use super::{StepHandler, StepOutcome};

fn fenced_json_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").unwrap())
}

/// Build a completion request from the step's config, with an optional
/// handler-imposed temperature.
fn request_for(step: &Step, prompt: String, temperature: Option<f64>) -> CompletionRequest {
    let config = &step.config;
    CompletionRequest {
        model: step
            .config_str("model")
            .unwrap_or(DEFAULT_MODEL)
            .to_string(),
        prompt,
        max_tokens: config
            .get("maxTokens")
            .and_then(|v| v.as_u64())
            .unwrap_or(1000) as u32,
        temperature: temperature.unwrap_or_else(|| {
            config
                .get("temperature")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.7)
        }),
    }
}

async fn complete(ctx: &StepContext, request: CompletionRequest) -> StepResult<String> {
    ctx.check_signal()?;
    Ok(ctx.llm.complete(request).await?)
}

/// Parse a JSON object out of a model response: fenced code block first, then
/// the first `{…}` substring. `None` when neither parses.
pub(crate) fn parse_json_response(text: &str) -> Option<Value> {
    if let Some(captures) = fenced_json_re().captures(text) {
        if let Ok(value) = serde_json::from_str::<Value>(&captures[1]) {
            return Some(value);
        }
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

/// The step's subject text: `config.input` path when set, otherwise the whole
/// inputs view.
fn subject_text(step: &Step, ctx: &StepContext) -> String {
    match step.config_str("input") {
        Some(path) => ctx
            .resolve_input(path)
            .map(|v| value_to_display(&v))
            .unwrap_or_default(),
        None => value_to_display(&ctx.inputs),
    }
}

/// `basic_llm_chain` — resolve the prompt template and return the raw text.
pub struct BasicLlmChainHandler;

#[async_trait]
impl StepHandler for BasicLlmChainHandler {
    async fn run(&self, step: &Step, ctx: &StepContext) -> StepResult<StepOutcome> {
        let template = step
            .config_str("prompt")
            .ok_or_else(|| StepError::ConfigError("basic_llm_chain requires a prompt".into()))?;
        let prompt = resolve_template(template, &ctx.inputs);
        let text = complete(ctx, request_for(step, prompt, None)).await?;
        Ok(StepOutcome::value(Value::String(text)))
    }
}

/// `ai_transform` — pick one input value, run it through a transform prompt.
pub struct AiTransformHandler;

#[async_trait]
impl StepHandler for AiTransformHandler {
    async fn run(&self, step: &Step, ctx: &StepContext) -> StepResult<StepOutcome> {
        let picked = match step.config_str("input") {
            Some(path) => ctx.resolve_input(path).unwrap_or(Value::Null),
            None => ctx.inputs.clone(),
        };
        let template = step
            .config_str("prompt")
            .unwrap_or("Transform this: {{_all}}");
        let prompt = resolve_template(template, &json!({ "_all": picked }));
        let text = complete(ctx, request_for(step, prompt, None)).await?;
        Ok(StepOutcome::value(Value::String(text)))
    }
}

/// `information_extractor` — instruct JSON extraction to a declared schema.
pub struct InformationExtractorHandler;

#[async_trait]
impl StepHandler for InformationExtractorHandler {
    async fn run(&self, step: &Step, ctx: &StepContext) -> StepResult<StepOutcome> {
        let schema = step.config.get("schema").cloned().unwrap_or(json!({}));
        let prompt = format!(
            "Extract structured data from the following input as JSON matching this schema:\n\
             {}\n\nInput:\n{}\n\nRespond with only the JSON object.",
            schema,
            subject_text(step, ctx),
        );
        let text = complete(ctx, request_for(step, prompt, Some(0.1))).await?;
        let output = parse_json_response(&text).unwrap_or(Value::String(text));
        Ok(StepOutcome::value(output))
    }
}

/// `qa_chain` — answer a templated question over a resolved context value.
pub struct QaChainHandler;

#[async_trait]
impl StepHandler for QaChainHandler {
    async fn run(&self, step: &Step, ctx: &StepContext) -> StepResult<StepOutcome> {
        let context_text = step
            .config_str("context")
            .and_then(|path| ctx.resolve_input(path))
            .map(|v| value_to_display(&v))
            .unwrap_or_default();
        let question = resolve_template(
            step.config_str("question").unwrap_or_default(),
            &ctx.inputs,
        );
        let prompt = format!(
            "Answer the question using the provided context.\n\n\
             Context:\n{context_text}\n\nQuestion:\n{question}",
        );
        let text = complete(ctx, request_for(step, prompt, None)).await?;
        Ok(StepOutcome::value(Value::String(text)))
    }
}

/// `sentiment_analysis` — structured sentiment verdict with a neutral
/// fallback when the response fails to parse.
pub struct SentimentAnalysisHandler;

#[async_trait]
impl StepHandler for SentimentAnalysisHandler {
    async fn run(&self, step: &Step, ctx: &StepContext) -> StepResult<StepOutcome> {
        let prompt = format!(
            "Analyze the sentiment of the following text. Respond with a JSON object \
             {{\"sentiment\": \"positive|negative|neutral\", \"score\": <number in [-1, 1]>, \
             \"explanation\": \"...\"}}.\n\nText: {}",
            subject_text(step, ctx),
        );
        let text = complete(ctx, request_for(step, prompt, Some(0.2))).await?;
        let output = parse_json_response(&text).unwrap_or_else(|| {
            json!({ "sentiment": "neutral", "score": 0, "explanation": text })
        });
        Ok(StepOutcome::value(output))
    }
}

/// `summarization_chain` — short/medium/long summary of the subject text.
pub struct SummarizationChainHandler;

#[async_trait]
impl StepHandler for SummarizationChainHandler {
    async fn run(&self, step: &Step, ctx: &StepContext) -> StepResult<StepOutcome> {
        let length = step.config_str("length").unwrap_or("medium");
        let prompt = format!(
            "Provide a {} summary of the following content.\n\n{}",
            length,
            subject_text(step, ctx),
        );
        let text = complete(ctx, request_for(step, prompt, None)).await?;
        Ok(StepOutcome::value(Value::String(text)))
    }
}

/// `text_classifier` — classify into configured categories, defaulting to the
/// first category when the response fails to parse.
pub struct TextClassifierHandler;

#[async_trait]
impl StepHandler for TextClassifierHandler {
    async fn run(&self, step: &Step, ctx: &StepContext) -> StepResult<StepOutcome> {
        let categories: Vec<String> = step
            .config
            .get("categories")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .filter(|v: &Vec<String>| !v.is_empty())
            .unwrap_or_else(|| vec!["positive".into(), "negative".into(), "neutral".into()]);

        let prompt = format!(
            "Classify the following text into one of the given categories. Respond with a \
             JSON object {{\"category\": \"...\", \"confidence\": <number in [0, 1]>, \
             \"explanation\": \"...\"}}.\nCategories: {}\nText: {}",
            categories.join(", "),
            subject_text(step, ctx),
        );
        let text = complete(ctx, request_for(step, prompt, Some(0.2))).await?;
        let output = parse_json_response(&text).unwrap_or_else(|| {
            json!({ "category": categories[0], "confidence": 0, "explanation": text })
        });
        Ok(StepOutcome::value(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_response_fenced() {
        let text = "Here you go:\n```json\n{\"a\": 1}\n```\nthanks";
        assert_eq!(parse_json_response(text), Some(json!({"a": 1})));
    }

    #[test]
    fn test_parse_json_response_bare_braces() {
        let text = "sure {\"a\": {\"b\": 2}} done";
        assert_eq!(parse_json_response(text), Some(json!({"a": {"b": 2}})));
    }

    #[test]
    fn test_parse_json_response_garbage() {
        assert_eq!(parse_json_response("no json here"), None);
        assert_eq!(parse_json_response("{broken"), None);
    }

    #[test]
    fn test_request_defaults() {
        let step = Step {
            id: "s1".into(),
            workflow_id: "w1".into(),
            kind: crate::model::StepKind::BasicLlmChain,
            label: String::new(),
            position: Value::Null,
            config: json!({"prompt": "hi"}),
            order: 0,
        };
        let req = request_for(&step, "hi".into(), None);
        assert_eq!(req.model, DEFAULT_MODEL);
        assert_eq!(req.max_tokens, 1000);
        assert!((req.temperature - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn test_request_config_overrides() {
        let step = Step {
            id: "s1".into(),
            workflow_id: "w1".into(),
            kind: crate::model::StepKind::SentimentAnalysis,
            label: String::new(),
            position: Value::Null,
            config: json!({"model": "m2", "maxTokens": 50, "temperature": 0.9}),
            order: 0,
        };
        let req = request_for(&step, "p".into(), Some(0.2));
        assert_eq!(req.model, "m2");
        assert_eq!(req.max_tokens, 50);
        // Handler-imposed temperature wins over config.
        assert!((req.temperature - 0.2).abs() < f64::EPSILON);
    }
}
