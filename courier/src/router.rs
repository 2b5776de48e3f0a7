//! Router configuration for the courier service.

use crate::api::{assignments, couriers, locations};
use crate::state::AppState;
use axum::routing::{get, patch, post, put};
use axum::{Json, Router};

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Build the complete axum router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(health_check))
        // Registry
        .route(
            "/couriers",
            post(couriers::create_courier).get(couriers::list_couriers),
        )
        .route(
            "/couriers/:id",
            get(couriers::get_courier)
                .put(couriers::update_courier)
                .delete(couriers::delete_courier),
        )
        .route("/couriers/:id/status", patch(couriers::set_status))
        .route("/couriers/:id/online", patch(couriers::set_online))
        .route("/couriers/available", post(couriers::find_available))
        .route("/couriers/:id/performance", get(couriers::performance))
        .route(
            "/couriers/:id/service-areas",
            post(couriers::add_service_area).get(couriers::list_service_areas),
        )
        .route(
            "/couriers/:id/working-hours",
            post(couriers::add_working_hours).get(couriers::list_working_hours),
        )
        // Locations
        .route(
            "/couriers/:id/location",
            put(locations::update_location).get(locations::get_location),
        )
        .route(
            "/couriers/:id/location/history",
            get(locations::location_history),
        )
        // Dispatch
        .route("/assign", post(assignments::assign_order))
        .route("/assign/manual", post(assignments::manual_assign))
        .route("/assignments/:id", get(assignments::get_assignment))
        .route(
            "/assignments/:id/status",
            patch(assignments::update_assignment_status),
        )
        .with_state(state)
}
