//! Courier registry endpoints.

use crate::state::AppState;
use crate::stores::ListPage;
use crate::types::{
    Courier, CourierAvailabilityRequest, CourierCandidate, CourierPerformanceStats, CourierStatus,
    CreateCourierRequest, CreateServiceAreaRequest, CreateWorkingHoursRequest, ServiceArea,
    SetOnlineRequest, SetStatusRequest, UpdateCourierRequest, WorkingHours,
};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use pazar_core::events::VehicleType;
use pazar_web::{ApiError, ApiResponse, PaginatedResponse, Pagination};
use serde::Deserialize;
use uuid::Uuid;

/// `POST /couriers`: register a courier.
pub async fn create_courier(
    State(state): State<AppState>,
    Json(request): Json<CreateCourierRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Courier>>), ApiError> {
    let courier = state.registry.create_courier(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Courier created", courier)),
    ))
}

/// `GET /couriers/{id}`: courier details.
pub async fn get_courier(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Courier>>, ApiError> {
    let courier = state.registry.get_courier(id).await?;
    Ok(Json(ApiResponse::ok("Courier retrieved", courier)))
}

/// Filters for `GET /couriers`.
#[derive(Debug, Deserialize)]
pub struct ListCouriersQuery {
    /// Filter by status.
    pub status: Option<CourierStatus>,
    /// Filter by vehicle type.
    pub vehicle_type: Option<VehicleType>,
    /// 1-indexed page, default 1.
    #[serde(default = "default_page")]
    pub page: u32,
    /// Page size, default 20, capped at 100.
    #[serde(default = "default_limit")]
    pub limit: u32,
}

const fn default_page() -> u32 {
    1
}

const fn default_limit() -> u32 {
    20
}

/// `GET /couriers`: paginated listing.
pub async fn list_couriers(
    State(state): State<AppState>,
    Query(query): Query<ListCouriersQuery>,
) -> Result<Json<PaginatedResponse<Courier>>, ApiError> {
    let page = ListPage {
        page: query.page.max(1),
        limit: query.limit.clamp(1, 100),
    };
    let (couriers, total) = state
        .registry
        .list_couriers(query.status, query.vehicle_type, page)
        .await?;

    Ok(Json(PaginatedResponse::ok(
        "Couriers retrieved",
        couriers,
        Pagination::new(page.page, page.limit, total),
    )))
}

/// `PUT /couriers/{id}`: partial update.
pub async fn update_courier(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateCourierRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state.registry.update_courier(id, request).await?;
    Ok(Json(ApiResponse::message_only("Courier updated")))
}

/// `DELETE /couriers/{id}`.
pub async fn delete_courier(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state.registry.delete_courier(id).await?;
    Ok(Json(ApiResponse::message_only("Courier deleted")))
}

/// `PATCH /couriers/{id}/status`.
pub async fn set_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<SetStatusRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state.registry.set_status(id, request.status).await?;
    Ok(Json(ApiResponse::message_only("Courier status updated")))
}

/// `PATCH /couriers/{id}/online`.
pub async fn set_online(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<SetOnlineRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state.registry.set_online(id, request.is_online).await?;
    Ok(Json(ApiResponse::message_only("Courier online flag updated")))
}

/// `POST /couriers/available`: ranked candidates around a point.
pub async fn find_available(
    State(state): State<AppState>,
    Json(request): Json<CourierAvailabilityRequest>,
) -> Result<Json<ApiResponse<Vec<CourierCandidate>>>, ApiError> {
    let candidates = state.registry.find_available(request).await?;
    Ok(Json(ApiResponse::ok("Available couriers", candidates)))
}

/// `GET /couriers/{id}/performance`.
pub async fn performance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<CourierPerformanceStats>>, ApiError> {
    let stats = state.registry.performance(id).await?;
    Ok(Json(ApiResponse::ok("Courier performance", stats)))
}

/// `POST /couriers/{id}/service-areas`.
pub async fn add_service_area(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<CreateServiceAreaRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ServiceArea>>), ApiError> {
    let area = state.registry.add_service_area(id, request).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Service area added", area)),
    ))
}

/// `GET /couriers/{id}/service-areas`.
pub async fn list_service_areas(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<ServiceArea>>>, ApiError> {
    let areas = state.registry.service_areas(id).await?;
    Ok(Json(ApiResponse::ok("Service areas", areas)))
}

/// `POST /couriers/{id}/working-hours`.
pub async fn add_working_hours(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<CreateWorkingHoursRequest>,
) -> Result<(StatusCode, Json<ApiResponse<WorkingHours>>), ApiError> {
    let hours = state.registry.add_working_hours(id, request).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Working hours added", hours)),
    ))
}

/// `GET /couriers/{id}/working-hours`.
pub async fn list_working_hours(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<WorkingHours>>>, ApiError> {
    let hours = state.registry.working_hours(id).await?;
    Ok(Json(ApiResponse::ok("Working hours", hours)))
}
