//! Order endpoints.

use crate::state::AppState;
use crate::stores::ListPage;
use crate::types::{
    AssignCourierRequest, CreateOrderRequest, Order, ProcessPaymentRequest,
    UpdateOrderStatusRequest,
};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use pazar_web::{ApiError, ApiResponse, PaginatedResponse, Pagination};
use serde::Deserialize;
use uuid::Uuid;

/// `POST /orders/{customer_id}`: convert the customer's cart into an order.
pub async fn create_order(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Order>>), ApiError> {
    let order = state.service.create_order(customer_id, request).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Order created", order)),
    ))
}

/// `GET /orders/{id}`: order details.
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Order>>, ApiError> {
    let order = state.service.get_order(id).await?;
    Ok(Json(ApiResponse::ok("Order retrieved", order)))
}

/// Filter for `GET /orders`; exactly one of the id filters must be present.
#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    /// Filter by customer.
    pub customer_id: Option<Uuid>,
    /// Filter by seller.
    pub seller_id: Option<Uuid>,
    /// Filter by courier.
    pub courier_id: Option<Uuid>,
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

/// `GET /orders`: paginated listing by customer, seller or courier.
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<PaginatedResponse<Order>>, ApiError> {
    let page = ListPage {
        page: query.page.max(1),
        limit: query.limit.clamp(1, 100),
    };

    let (orders, total) = match (query.customer_id, query.seller_id, query.courier_id) {
        (Some(customer_id), None, None) => {
            state.service.orders_for_customer(customer_id, page).await?
        }
        (None, Some(seller_id), None) => state.service.orders_for_seller(seller_id, page).await?,
        (None, None, Some(courier_id)) => {
            state.service.orders_for_courier(courier_id, page).await?
        }
        _ => {
            return Err(ApiError::bad_request(
                "provide exactly one of customer_id, seller_id or courier_id",
            ))
        }
    };

    Ok(Json(PaginatedResponse::ok(
        "Orders retrieved",
        orders,
        Pagination::new(page.page, page.limit, total),
    )))
}

/// `PATCH /orders/{id}/status`: move the order through its state machine.
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> Result<Json<ApiResponse<Order>>, ApiError> {
    let order = state
        .service
        .update_order_status(id, request.status, request.notes)
        .await?;
    Ok(Json(ApiResponse::ok("Order status updated", order)))
}

/// `PATCH /orders/{id}/assign-courier`: record the courier on the order.
pub async fn assign_courier(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<AssignCourierRequest>,
) -> Result<Json<ApiResponse<Order>>, ApiError> {
    let order = state.service.assign_courier(id, request.courier_id).await?;
    Ok(Json(ApiResponse::ok("Courier assigned", order)))
}

/// `POST /orders/{id}/payment`: capture payment for a `CREATED` order.
pub async fn process_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ProcessPaymentRequest>,
) -> Result<Json<ApiResponse<Order>>, ApiError> {
    let order = state
        .service
        .process_payment(id, &request.payment_method_id)
        .await?;
    Ok(Json(ApiResponse::ok("Payment processed", order)))
}
