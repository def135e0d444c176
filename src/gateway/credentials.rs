//! Credential CRUD. List responses blank the secret material.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use crate::model::Credential;

use super::{parse_body, ApiError, AppState};

#[derive(Debug, Deserialize)]
struct CreateCredentialRequest {
    name: String,
    #[serde(rename = "type")]
    credential_type: String,
    #[serde(default)]
    data: Value,
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Credential>>, ApiError> {
    let credentials = state.store.list_credentials().await?;
    Ok(Json(credentials.iter().map(Credential::redacted).collect()))
}

pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Credential>, ApiError> {
    let request: CreateCredentialRequest = parse_body(body)?;
    let credential = Credential::new(request.name, request.credential_type, request.data);
    Ok(Json(state.store.create_credential(credential).await?))
}

pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.store.delete_credential(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("credential {id} not found")))
    }
}
