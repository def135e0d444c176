//! Workflow CRUD, including full graph replacement on PATCH.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::model::{new_id, Edge, Step, StepKind, Workflow};
use crate::model::workflow::WorkflowUpdate;

use super::{parse_body, ApiError, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateWorkflowRequest {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    is_active: Option<bool>,
}

/// Step as sent by the editor: ids and ordering are optional.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StepDraft {
    #[serde(default)]
    id: Option<String>,
    kind: StepKind,
    #[serde(default)]
    label: String,
    #[serde(default)]
    position: Value,
    #[serde(default)]
    config: Value,
    #[serde(default)]
    order: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EdgeDraft {
    #[serde(default)]
    id: Option<String>,
    source_id: String,
    target_id: String,
    #[serde(default)]
    label: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PatchWorkflowRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    is_active: Option<bool>,
    #[serde(default)]
    steps: Option<Vec<StepDraft>>,
    #[serde(default)]
    edges: Option<Vec<EdgeDraft>>,
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Workflow>>, ApiError> {
    Ok(Json(state.store.list_workflows().await?))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let workflow = state
        .store
        .get_workflow(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("workflow {id} not found")))?;
    let steps = state.store.get_steps(&id).await?;
    let edges = state.store.get_edges(&id).await?;

    let mut body = serde_json::to_value(&workflow).unwrap_or_default();
    if let Some(object) = body.as_object_mut() {
        object.insert("steps".into(), json!(steps));
        object.insert("edges".into(), json!(edges));
    }
    Ok(Json(body))
}

pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Workflow>, ApiError> {
    let request: CreateWorkflowRequest = parse_body(body)?;
    let mut workflow = Workflow::new(request.name);
    workflow.description = request.description;
    if let Some(is_active) = request.is_active {
        workflow.is_active = is_active;
    }
    Ok(Json(state.store.create_workflow(workflow).await?))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Workflow>, ApiError> {
    let request: PatchWorkflowRequest = parse_body(body)?;
    if state.store.get_workflow(&id).await?.is_none() {
        return Err(ApiError::not_found(format!("workflow {id} not found")));
    }

    // Graph replacement first, so a bad graph leaves the fields untouched.
    match (request.steps, request.edges) {
        (None, None) => {}
        (Some(step_drafts), edge_drafts) => {
            let (steps, edges) =
                materialize_graph(&id, step_drafts, edge_drafts.unwrap_or_default())?;
            state.store.replace_graph(&id, steps, edges).await?;
        }
        (None, Some(_)) => {
            return Err(ApiError::validation(
                "edges cannot be replaced without steps",
            ));
        }
    }

    let updated = state
        .store
        .update_workflow(
            &id,
            WorkflowUpdate {
                name: request.name,
                description: request.description,
                is_active: request.is_active,
            },
        )
        .await?
        .ok_or_else(|| ApiError::not_found(format!("workflow {id} not found")))?;
    Ok(Json(updated))
}

pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.store.delete_workflow(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("workflow {id} not found")))
    }
}

/// Assign ids, pin the workflow id, and check that every edge endpoint names
/// a step of this graph.
fn materialize_graph(
    workflow_id: &str,
    step_drafts: Vec<StepDraft>,
    edge_drafts: Vec<EdgeDraft>,
) -> Result<(Vec<Step>, Vec<Edge>), ApiError> {
    let steps: Vec<Step> = step_drafts
        .into_iter()
        .map(|draft| Step {
            id: draft.id.unwrap_or_else(new_id),
            workflow_id: workflow_id.to_string(),
            kind: draft.kind,
            label: draft.label,
            position: draft.position,
            config: draft.config,
            order: draft.order,
        })
        .collect();

    let known: std::collections::HashSet<&str> = steps.iter().map(|s| s.id.as_str()).collect();
    let edges: Vec<Edge> = edge_drafts
        .into_iter()
        .map(|draft| Edge {
            id: draft.id.unwrap_or_else(new_id),
            workflow_id: workflow_id.to_string(),
            source_id: draft.source_id,
            target_id: draft.target_id,
            label: draft.label,
        })
        .collect();

    for edge in &edges {
        if !known.contains(edge.source_id.as_str()) || !known.contains(edge.target_id.as_str()) {
            return Err(ApiError::validation(format!(
                "edge {} references a step outside this workflow",
                edge.id
            )));
        }
    }

    Ok((steps, edges))
}
