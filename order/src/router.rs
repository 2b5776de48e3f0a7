//! Router configuration for the order service.

use crate::api::{carts, orders};
use crate::state::AppState;
use axum::routing::{get, patch, post};
use axum::{Json, Router};

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Build the complete axum router.
///
/// The `POST /orders/{customer_id}` and `GET /orders/{id}` contract shares
/// one path shape, so both register on the same route with the parameter
/// interpreted per method.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(health_check))
        // Orders
        .route(
            "/orders/:id",
            get(orders::get_order).post(orders::create_order),
        )
        .route("/orders", get(orders::list_orders))
        .route("/orders/:id/status", patch(orders::update_order_status))
        .route(
            "/orders/:id/assign-courier",
            patch(orders::assign_courier),
        )
        .route("/orders/:id/payment", post(orders::process_payment))
        // Cart
        .route(
            "/cart/:customer_id",
            get(carts::get_cart).delete(carts::clear_cart),
        )
        .route("/cart/:customer_id/items", post(carts::add_item))
        .route(
            "/cart/:customer_id/items/:item_id",
            patch(carts::update_item).delete(carts::remove_item),
        )
        .route("/cart/:customer_id/summary", get(carts::cart_summary))
        .with_state(state)
}
