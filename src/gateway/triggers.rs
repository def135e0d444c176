//! The four trigger paths: manual execute (synchronous), webhook with HMAC
//! verification, app-event fanout, and workflow chaining. Webhook, event, and
//! chain requests return `202` with run ids without awaiting terminal status.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::info;

use crate::model::{ExecutionStatus, Step, StepKind, TriggerEnvelope, Workflow, WorkflowExecution};

use super::{parse_body, ApiError, AppState};

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_HEADER: &str = "x-webhook-signature";

pub async fn execute(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<WorkflowExecution>, ApiError> {
    let payload: Value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::validation(format!("invalid JSON body: {e}")))?
    };
    let execution = state
        .engine
        .start_run(&id, TriggerEnvelope::Manual { payload })
        .await?;
    Ok(Json(execution))
}

pub async fn webhook(
    State(state): State<AppState>,
    Path(webhook_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let (workflow, step) = find_webhook_step(&state, &webhook_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("no webhook registered as {webhook_id}")))?;

    if let Some(secret) = step.config_str("secret") {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                ApiError::unauthorized("WEBHOOK_SIGNATURE_MISSING", "missing webhook signature")
            })?;
        if !verify_signature(secret, &body, signature) {
            return Err(ApiError::unauthorized(
                "WEBHOOK_SIGNATURE_INVALID",
                "webhook signature mismatch",
            ));
        }
    }

    let payload: Value = if body.is_empty() {
        json!({})
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::validation(format!("invalid JSON body: {e}")))?
    };

    let header_map: HashMap<String, String> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    let envelope = TriggerEnvelope::Webhook {
        webhook_id,
        payload,
        headers: header_map,
        query,
    };
    let execution_id = state.engine.clone().spawn_run(&workflow.id, envelope).await?;
    info!(workflow_id = %workflow.id, execution_id, "webhook admitted");
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "executionId": execution_id })),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppEventRequest {
    event_type: String,
    #[serde(default)]
    payload: Value,
}

pub async fn app_event(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let request: AppEventRequest = parse_body(body)?;

    let mut matched: Vec<String> = Vec::new();
    for workflow in state.store.list_workflows().await? {
        if !workflow.is_active {
            continue;
        }
        let steps = state.store.get_steps(&workflow.id).await?;
        let subscribed = steps.iter().any(|s| {
            s.kind == StepKind::AppEventTrigger
                && s.config_str("eventType") == Some(request.event_type.as_str())
        });
        if subscribed {
            matched.push(workflow.id);
        }
    }
    if matched.is_empty() {
        return Err(ApiError::not_found(format!(
            "no active workflow subscribes to {}",
            request.event_type
        )));
    }

    let mut execution_ids = Vec::with_capacity(matched.len());
    for workflow_id in matched {
        let envelope = TriggerEnvelope::AppEvent {
            event_type: request.event_type.clone(),
            payload: request.payload.clone(),
        };
        execution_ids.push(state.engine.clone().spawn_run(&workflow_id, envelope).await?);
    }
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "executionIds": execution_ids })),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChainRequest {
    target_workflow_id: String,
}

pub async fn chain(
    State(state): State<AppState>,
    Path(source_id): Path<String>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let request: ChainRequest = parse_body(body)?;
    if state.store.get_workflow(&source_id).await?.is_none() {
        return Err(ApiError::not_found(format!(
            "workflow {source_id} not found"
        )));
    }

    let latest = state
        .store
        .list_executions(&source_id)
        .await?
        .into_iter()
        .next()
        .filter(|run| run.status == ExecutionStatus::Completed)
        .ok_or_else(|| {
            ApiError::validation(format!(
                "workflow {source_id} has no completed run to chain from"
            ))
        })?;

    let envelope = TriggerEnvelope::Workflow {
        source_workflow_id: source_id,
        source_execution_id: latest.id,
        outputs: latest.outputs,
    };
    let execution_id = state
        .engine
        .clone()
        .spawn_run(&request.target_workflow_id, envelope)
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "executionId": execution_id })),
    ))
}

async fn find_webhook_step(
    state: &AppState,
    webhook_id: &str,
) -> Result<Option<(Workflow, Step)>, ApiError> {
    for workflow in state.store.list_workflows().await? {
        if !workflow.is_active {
            continue;
        }
        let steps = state.store.get_steps(&workflow.id).await?;
        if let Some(step) = steps.into_iter().find(|s| {
            s.kind == StepKind::WebhookTrigger && s.config_str("webhookId") == Some(webhook_id)
        }) {
            return Ok(Some((workflow, step)));
        }
    }
    Ok(None)
}

/// Constant-time HMAC-SHA256 check of the raw body against a hex signature.
fn verify_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&signature).is_ok()
}
