//! Instance inspection and stop.

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use pipeserve_core::{JobParameters, JobStatus};

use super::handlers::{error_response, ApiError};
use crate::state::AppState;

/// Status of every instance in creation order.
pub async fn list_instances(State(state): State<Arc<AppState>>) -> Json<Vec<JobStatus>> {
    Json(state.manager().list_all().await)
}

/// Template, request and rendered launch command of one instance.
pub async fn get_instance(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobParameters>, ApiError> {
    state
        .manager()
        .get_parameters(&id)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobStatus>, ApiError> {
    state
        .manager()
        .get_status(&id)
        .await
        .map(Json)
        .map_err(error_response)
}

/// Request a stop. The returned status may still be RUNNING until the engine
/// acknowledges.
pub async fn stop_instance(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobStatus>, ApiError> {
    state
        .manager()
        .stop(&id)
        .await
        .map(Json)
        .map_err(error_response)
}
