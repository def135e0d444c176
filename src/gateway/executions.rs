//! Run introspection and cancellation.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use crate::model::WorkflowExecution;

use super::{ApiError, AppState};

pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<WorkflowExecution>, ApiError> {
    let execution = state
        .store
        .get_execution(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("execution {id} not found")))?;
    Ok(Json(execution))
}

pub async fn list(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
) -> Result<Json<Vec<WorkflowExecution>>, ApiError> {
    if state.store.get_workflow(&workflow_id).await?.is_none() {
        return Err(ApiError::not_found(format!(
            "workflow {workflow_id} not found"
        )));
    }
    Ok(Json(state.store.list_executions(&workflow_id).await?))
}

pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if state.engine.cancel(&id) {
        Ok((StatusCode::ACCEPTED, Json(json!({ "cancelled": true }))))
    } else {
        Err(ApiError::not_found(format!(
            "execution {id} is not running"
        )))
    }
}
