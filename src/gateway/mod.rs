//! HTTP admission layer: workflow CRUD, run introspection, and the four
//! trigger paths (manual execute, webhook, app-event fanout, chaining).

mod credentials;
mod executions;
mod triggers;
mod workflows;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::engine::Engine;
use crate::error::EngineError;
use crate::store::{Store, StoreError};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub engine: Arc<Engine>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/workflows",
            get(workflows::list).post(workflows::create),
        )
        .route(
            "/api/workflows/{id}",
            get(workflows::get_one)
                .patch(workflows::update)
                .delete(workflows::remove),
        )
        .route("/api/workflows/{id}/execute", post(triggers::execute))
        .route("/api/workflows/{id}/executions", get(executions::list))
        .route("/api/workflows/{id}/chain", post(triggers::chain))
        .route("/api/executions/{id}", get(executions::get_one))
        .route("/api/executions/{id}/cancel", post(executions::cancel))
        .route("/api/webhooks/{webhook_id}", post(triggers::webhook))
        .route("/api/events", post(triggers::app_event))
        .route(
            "/api/credentials",
            get(credentials::list).post(credentials::create),
        )
        .route("/api/credentials/{id}", delete(credentials::remove))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// HTTP-layer error with a stable code, rendered as `{error, code}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        ApiError {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
    }

    pub fn unauthorized(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, code, message)
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.message, "code": self.code }));
        (self.status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(message) => ApiError::not_found(message),
            StoreError::Backend(message) => ApiError::internal(message),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match &e {
            EngineError::WorkflowNotFound(_) | EngineError::StepNotFound(_) => {
                ApiError::new(StatusCode::NOT_FOUND, e.code(), e.to_string())
            }
            _ => ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.code(), e.to_string()),
        }
    }
}

/// Parse a JSON body into a typed request, mapping failures to 400
/// `VALIDATION_ERROR`.
pub(crate) fn parse_body<T: serde::de::DeserializeOwned>(
    body: serde_json::Value,
) -> Result<T, ApiError> {
    serde_json::from_value(body).map_err(|e| ApiError::validation(e.to_string()))
}
