//! Location endpoints.

use crate::ingest::IngestOutcome;
use crate::state::AppState;
use crate::types::{CourierLocationUpdate, UpdateLocationRequest};
use axum::extract::{Path, Query, State};
use axum::Json;
use pazar_core::Location;
use pazar_web::{ApiError, ApiResponse};
use serde::Deserialize;
use uuid::Uuid;

/// `PUT /couriers/{id}/location`: one location report from the courier
/// app. 429 when rate limited, 503 when the ingest queue is full.
pub async fn update_location(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateLocationRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let outcome = state.ingestor.update_location(id, request).await?;
    let message = match outcome {
        IngestOutcome::Queued => "Location update accepted",
        IngestOutcome::Debounced => "Location unchanged",
    };
    Ok(Json(ApiResponse::message_only(message)))
}

/// `GET /couriers/{id}/location`: current location (cache first).
pub async fn get_location(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Location>>, ApiError> {
    let location = state.registry.current_location(id).await?;
    Ok(Json(ApiResponse::ok("Courier location", location)))
}

/// Query parameters for the history endpoint.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Maximum samples to return, default 50.
    #[serde(default = "default_limit")]
    pub limit: i64,
}

const fn default_limit() -> i64 {
    50
}

/// `GET /couriers/{id}/location/history?limit=`: recent samples, newest
/// first.
pub async fn location_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ApiResponse<Vec<CourierLocationUpdate>>>, ApiError> {
    let history = state.registry.location_history(id, query.limit).await?;
    Ok(Json(ApiResponse::ok("Location history", history)))
}
