//! Step handlers: one per step kind, registered in a lookup table.
//!
//! The `loop` kind is the one member of the closed set not handled here — it
//! re-enters the traversal and is therefore run by the flow controller
//! directly.

pub mod ai;
pub mod code;
pub mod condition;
pub mod filter;
pub mod merge;
pub mod switch;
pub mod triggers;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::engine::StepContext;
use crate::error::StepResult;
use crate::model::{Step, StepKind};

/// Which outgoing edges the flow controller should follow after a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchSelection {
    /// Follow every outgoing edge (non-branching steps).
    All,
    /// Follow edges whose label is in the set; prune the rest.
    Take(Vec<String>),
    /// Prune every outgoing edge (unresolved switch, loop post-iteration).
    None,
}

/// Result of one handler invocation.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub output: Value,
    pub branch: BranchSelection,
}

impl StepOutcome {
    /// Plain value outcome for non-branching steps.
    pub fn value(output: Value) -> Self {
        StepOutcome {
            output,
            branch: BranchSelection::All,
        }
    }

    pub fn branched(output: Value, labels: Vec<String>) -> Self {
        StepOutcome {
            output,
            branch: BranchSelection::Take(labels),
        }
    }
}

/// Trait for step execution. Each step kind implements this.
#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn run(&self, step: &Step, ctx: &StepContext) -> StepResult<StepOutcome>;
}

/// Registry of step handlers by kind.
pub struct HandlerRegistry {
    handlers: HashMap<StepKind, Box<dyn StepHandler>>,
}

impl HandlerRegistry {
    pub fn empty() -> Self {
        HandlerRegistry {
            handlers: HashMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = HandlerRegistry::empty();

        for kind in [
            StepKind::ManualTrigger,
            StepKind::ScheduleTrigger,
            StepKind::WebhookTrigger,
            StepKind::AppEventTrigger,
            StepKind::WorkflowTrigger,
        ] {
            registry.register(kind, Box::new(triggers::TriggerHandler));
        }

        registry.register(StepKind::BasicLlmChain, Box::new(ai::BasicLlmChainHandler));
        registry.register(StepKind::AiTransform, Box::new(ai::AiTransformHandler));
        registry.register(
            StepKind::InformationExtractor,
            Box::new(ai::InformationExtractorHandler),
        );
        registry.register(StepKind::QaChain, Box::new(ai::QaChainHandler));
        registry.register(
            StepKind::SentimentAnalysis,
            Box::new(ai::SentimentAnalysisHandler),
        );
        registry.register(
            StepKind::SummarizationChain,
            Box::new(ai::SummarizationChainHandler),
        );
        registry.register(StepKind::TextClassifier, Box::new(ai::TextClassifierHandler));

        registry.register(StepKind::Condition, Box::new(condition::ConditionHandler));
        registry.register(StepKind::Switch, Box::new(switch::SwitchHandler));
        registry.register(StepKind::Filter, Box::new(filter::FilterHandler));
        registry.register(StepKind::Merge, Box::new(merge::MergeHandler));
        registry.register(StepKind::Code, Box::new(code::CodeHandler));

        registry
    }

    pub fn register(&mut self, kind: StepKind, handler: Box<dyn StepHandler>) {
        self.handlers.insert(kind, handler);
    }

    pub fn get(&self, kind: StepKind) -> Option<&dyn StepHandler> {
        self.handlers.get(&kind).map(|h| h.as_ref())
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
