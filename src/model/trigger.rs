use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{Step, StepKind};

/// Typed payload admitted by the trigger gateway.
///
/// The engine seeds the run's outputs map with the envelope under the matching
/// trigger step, so downstream steps can reference the trigger data by step id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerEnvelope {
    Manual {
        #[serde(default)]
        payload: Value,
    },
    Webhook {
        webhook_id: String,
        #[serde(default)]
        payload: Value,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default)]
        query: HashMap<String, String>,
    },
    AppEvent {
        event_type: String,
        #[serde(default)]
        payload: Value,
    },
    Workflow {
        source_workflow_id: String,
        source_execution_id: String,
        #[serde(default)]
        outputs: HashMap<String, Value>,
    },
}

impl TriggerEnvelope {
    pub fn trigger_type(&self) -> &'static str {
        match self {
            TriggerEnvelope::Manual { .. } => "manual",
            TriggerEnvelope::Webhook { .. } => "webhook",
            TriggerEnvelope::AppEvent { .. } => "app_event",
            TriggerEnvelope::Workflow { .. } => "workflow",
        }
    }

    /// Whether `step` is the trigger step this envelope addresses.
    pub fn matches_step(&self, step: &Step) -> bool {
        match self {
            TriggerEnvelope::Manual { .. } => {
                matches!(step.kind, StepKind::ManualTrigger | StepKind::ScheduleTrigger)
            }
            TriggerEnvelope::Webhook { webhook_id, .. } => {
                step.kind == StepKind::WebhookTrigger
                    && step.config_str("webhookId") == Some(webhook_id.as_str())
            }
            TriggerEnvelope::AppEvent { event_type, .. } => {
                step.kind == StepKind::AppEventTrigger
                    && step.config_str("eventType") == Some(event_type.as_str())
            }
            TriggerEnvelope::Workflow { .. } => step.kind == StepKind::WorkflowTrigger,
        }
    }

    /// Value seeded into `outputs[trigger_step.id]` at run start.
    pub fn seed_value(&self) -> Value {
        let mut obj = serde_json::Map::new();
        obj.insert("triggered".into(), json!(true));
        obj.insert("triggerType".into(), json!(self.trigger_type()));
        match self {
            TriggerEnvelope::Manual { payload } => {
                obj.insert("payload".into(), payload.clone());
            }
            TriggerEnvelope::Webhook {
                webhook_id,
                payload,
                headers,
                query,
            } => {
                obj.insert("webhookId".into(), json!(webhook_id));
                obj.insert("payload".into(), payload.clone());
                obj.insert("headers".into(), json!(headers));
                obj.insert("query".into(), json!(query));
            }
            TriggerEnvelope::AppEvent { event_type, payload } => {
                obj.insert("eventType".into(), json!(event_type));
                obj.insert("payload".into(), payload.clone());
            }
            TriggerEnvelope::Workflow {
                source_workflow_id,
                source_execution_id,
                ..
            } => {
                obj.insert("sourceWorkflowId".into(), json!(source_workflow_id));
                obj.insert("sourceExecutionId".into(), json!(source_execution_id));
            }
        }
        Value::Object(obj)
    }

    /// Prior outputs carried by a chained run, merged into the new run's map.
    pub fn carried_outputs(&self) -> Option<&HashMap<String, Value>> {
        match self {
            TriggerEnvelope::Workflow { outputs, .. } => Some(outputs),
            _ => None,
        }
    }
}
