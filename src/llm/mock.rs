//! Deterministic mock provider, selected when no credential is configured.
//!
//! Text-returning prompts get a `"[MOCK] "`-prefixed echo; the structured
//! prompts built by the AI step handlers (sentiment, classification,
//! extraction) get fixed sentinel JSON so downstream parsing behaves as in
//! live mode. A small sleep simulates provider latency.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::{CompletionRequest, LlmError, LlmProvider};

pub struct MockProvider {
    latency: Duration,
}

impl MockProvider {
    pub fn new() -> Self {
        MockProvider {
            latency: Duration::from_millis(500),
        }
    }

    pub fn with_latency(latency: Duration) -> Self {
        MockProvider { latency }
    }

    fn respond(prompt: &str) -> String {
        if let Some(rest) = prompt.strip_prefix("Transform this:") {
            return format!("[MOCK] Transformed: {}", rest.trim());
        }
        if prompt.contains("Analyze the sentiment") {
            return json!({
                "sentiment": "positive",
                "score": 0.8,
                "explanation": "[MOCK] deterministic sentiment",
            })
            .to_string();
        }
        if prompt.contains("Classify the following") {
            let category = prompt
                .lines()
                .find_map(|line| line.strip_prefix("Categories: "))
                .and_then(|list| list.split(',').next())
                .map(|c| c.trim().to_string())
                .unwrap_or_else(|| "unknown".to_string());
            return json!({
                "category": category,
                "confidence": 0.9,
                "explanation": "[MOCK] deterministic classification",
            })
            .to_string();
        }
        if prompt.contains("Extract structured data") {
            return json!({
                "extracted": true,
                "note": "[MOCK] placeholder extraction",
            })
            .to_string();
        }
        format!("[MOCK] Response to: {}", prompt)
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        tokio::time::sleep(self.latency).await;
        Ok(Self::respond(&request.prompt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: &str) -> CompletionRequest {
        CompletionRequest {
            model: "test".into(),
            prompt: prompt.into(),
            max_tokens: 100,
            temperature: 0.0,
        }
    }

    #[tokio::test]
    async fn test_plain_prompt_echo() {
        let provider = MockProvider::with_latency(Duration::ZERO);
        let text = provider.complete(request("ok")).await.unwrap();
        assert_eq!(text, "[MOCK] Response to: ok");
    }

    #[tokio::test]
    async fn test_transform_prompt() {
        let provider = MockProvider::with_latency(Duration::ZERO);
        let text = provider
            .complete(request("Transform this: {\"m\":\"hi\"}"))
            .await
            .unwrap();
        assert_eq!(text, "[MOCK] Transformed: {\"m\":\"hi\"}");
    }

    #[tokio::test]
    async fn test_sentiment_sentinel_parses() {
        let provider = MockProvider::with_latency(Duration::ZERO);
        let text = provider
            .complete(request("Analyze the sentiment of the following text."))
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["sentiment"], json!("positive"));
        assert_eq!(parsed["score"], json!(0.8));
    }

    #[tokio::test]
    async fn test_classifier_uses_first_category() {
        let provider = MockProvider::with_latency(Duration::ZERO);
        let prompt = "Classify the following text.\nCategories: spam, ham\nText: hi";
        let text = provider.complete(request(prompt)).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["category"], json!("spam"));
    }

    #[tokio::test]
    async fn test_determinism() {
        let provider = MockProvider::with_latency(Duration::ZERO);
        let a = provider.complete(request("same")).await.unwrap();
        let b = provider.complete(request("same")).await.unwrap();
        assert_eq!(a, b);
    }
}
