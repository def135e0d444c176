use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Closed set of step kinds dispatched by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    // Triggers
    ManualTrigger,
    ScheduleTrigger,
    WebhookTrigger,
    AppEventTrigger,
    WorkflowTrigger,
    // AI
    BasicLlmChain,
    AiTransform,
    InformationExtractor,
    QaChain,
    SentimentAnalysis,
    SummarizationChain,
    TextClassifier,
    // Flow
    Condition,
    Switch,
    Loop,
    Filter,
    Merge,
    // Code
    Code,
}

impl StepKind {
    pub fn is_trigger(&self) -> bool {
        matches!(
            self,
            StepKind::ManualTrigger
                | StepKind::ScheduleTrigger
                | StepKind::WebhookTrigger
                | StepKind::AppEventTrigger
                | StepKind::WorkflowTrigger
        )
    }

    /// Wire name, e.g. `basic_llm_chain`.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::ManualTrigger => "manual_trigger",
            StepKind::ScheduleTrigger => "schedule_trigger",
            StepKind::WebhookTrigger => "webhook_trigger",
            StepKind::AppEventTrigger => "app_event_trigger",
            StepKind::WorkflowTrigger => "workflow_trigger",
            StepKind::BasicLlmChain => "basic_llm_chain",
            StepKind::AiTransform => "ai_transform",
            StepKind::InformationExtractor => "information_extractor",
            StepKind::QaChain => "qa_chain",
            StepKind::SentimentAnalysis => "sentiment_analysis",
            StepKind::SummarizationChain => "summarization_chain",
            StepKind::TextClassifier => "text_classifier",
            StepKind::Condition => "condition",
            StepKind::Switch => "switch",
            StepKind::Loop => "loop",
            StepKind::Filter => "filter",
            StepKind::Merge => "merge",
            StepKind::Code => "code",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work inside a workflow graph.
///
/// `order` only breaks ties between siblings with no data dependency; the
/// traversal itself is driven by edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: String,
    pub workflow_id: String,
    pub kind: StepKind,
    #[serde(default)]
    pub label: String,
    /// Opaque UI hint, persisted verbatim for the editor.
    #[serde(default)]
    pub position: Value,
    /// Kind-specific configuration map.
    #[serde(default)]
    pub config: Value,
    #[serde(default)]
    pub order: i32,
}

impl Step {
    /// String field from `config`, if present.
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(|v| v.as_str())
    }
}

/// Directed connector between two steps. `label` carries the branch tag for
/// condition (`"true"`/`"false"`) and switch (case value or `"default"`)
/// sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    pub workflow_id: String,
    pub source_id: String,
    pub target_id: String,
    #[serde(default)]
    pub label: Option<String>,
}
