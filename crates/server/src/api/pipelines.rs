//! Template listing and instance creation.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use pipeserve_core::{ManagerError, PipelineRequest, PoolStatus, TemplateSummary};

use super::handlers::{error_response, ApiError};
use crate::state::AppState;

/// Response for instance creation.
#[derive(Debug, Serialize)]
pub struct CreateInstanceResponse {
    /// Id of the queued instance.
    pub id: String,
}

/// List every loaded template.
pub async fn list_pipelines(State(state): State<Arc<AppState>>) -> Json<Vec<TemplateSummary>> {
    Json(state.manager().list_templates())
}

/// Get one template by name and version.
pub async fn get_pipeline(
    State(state): State<Arc<AppState>>,
    Path((name, version)): Path<(String, String)>,
) -> Result<Json<TemplateSummary>, ApiError> {
    state
        .manager()
        .get_template(&name, &version)
        .map(Json)
        .map_err(error_response)
}

/// Validate the request body and queue a new instance.
///
/// Returns 201 with the instance id as soon as the instance is queued; the
/// engine starts asynchronously.
pub async fn create_instance(
    State(state): State<Arc<AppState>>,
    Path((name, version)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<CreateInstanceResponse>), ApiError> {
    let request = PipelineRequest::from_value(body)
        .map_err(|e| error_response(ManagerError::InvalidRequest(e)))?;
    let id = state
        .manager()
        .create_instance(&name, &version, request)
        .await
        .map_err(error_response)?;
    debug!("Queued {} {} as {}", name, version, id);
    Ok((StatusCode::CREATED, Json(CreateInstanceResponse { id })))
}

/// Admission pool occupancy.
pub async fn pool_status(State(state): State<Arc<AppState>>) -> Json<PoolStatus> {
    Json(state.manager().pool_status().await)
}
