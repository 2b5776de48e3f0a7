//! Dispatch and assignment endpoints.

use crate::state::AppState;
use crate::types::{
    Assignment, AssignmentResponse, AssignOrderRequest, ManualAssignRequest,
    UpdateAssignmentStatusRequest,
};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use pazar_web::{ApiError, ApiResponse};
use uuid::Uuid;

/// `POST /assign`: dispatch a courier for a paid order.
///
/// Admission refusals and empty pools come back as 503 with the refusal
/// tag in the body; they are retryable.
pub async fn assign_order(
    State(state): State<AppState>,
    Json(request): Json<AssignOrderRequest>,
) -> Result<(StatusCode, Json<AssignmentResponse>), ApiError> {
    let response = state.dispatcher.assign_order(request).await?;
    let status = if response.success {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    Ok((status, Json(response)))
}

/// `POST /assign/manual`: admin override for a specific courier.
pub async fn manual_assign(
    State(state): State<AppState>,
    Json(request): Json<ManualAssignRequest>,
) -> Result<Json<AssignmentResponse>, ApiError> {
    let response = state.dispatcher.manual_assign(request).await?;
    Ok(Json(response))
}

/// `GET /assignments/{id}`.
pub async fn get_assignment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Assignment>>, ApiError> {
    let assignment = state.registry.get_assignment(id).await?;
    Ok(Json(ApiResponse::ok("Assignment retrieved", assignment)))
}

/// `PATCH /assignments/{id}/status`.
pub async fn update_assignment_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateAssignmentStatusRequest>,
) -> Result<Json<ApiResponse<Assignment>>, ApiError> {
    let assignment = state
        .registry
        .update_assignment_status(id, request.status, request.notes)
        .await?;
    Ok(Json(ApiResponse::ok("Assignment status updated", assignment)))
}
