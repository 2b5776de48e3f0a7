//! Cart endpoints.

use crate::state::AppState;
use crate::types::{AddToCartRequest, Cart, CartItem, CartSummary, UpdateCartItemRequest};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use pazar_web::{ApiError, ApiResponse};
use uuid::Uuid;

/// `GET /cart/{customer_id}`: the customer's cart, created if absent.
pub async fn get_cart(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Cart>>, ApiError> {
    let cart = state.service.get_cart(customer_id).await?;
    Ok(Json(ApiResponse::ok("Cart retrieved", cart)))
}

/// `POST /cart/{customer_id}/items`: add an item.
pub async fn add_item(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
    Json(request): Json<AddToCartRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CartItem>>), ApiError> {
    let item = state.service.add_to_cart(customer_id, request).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Item added to cart", item)),
    ))
}

/// `PATCH /cart/{customer_id}/items/{item_id}`: update quantity or note.
pub async fn update_item(
    State(state): State<AppState>,
    Path((customer_id, item_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<UpdateCartItemRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state
        .service
        .update_cart_item(customer_id, item_id, request)
        .await?;
    Ok(Json(ApiResponse::message_only("Cart item updated")))
}

/// `DELETE /cart/{customer_id}/items/{item_id}`: remove an item.
pub async fn remove_item(
    State(state): State<AppState>,
    Path((customer_id, item_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state.service.remove_from_cart(customer_id, item_id).await?;
    Ok(Json(ApiResponse::message_only("Cart item removed")))
}

/// `DELETE /cart/{customer_id}`: empty the cart.
pub async fn clear_cart(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state.service.clear_cart(customer_id).await?;
    Ok(Json(ApiResponse::message_only("Cart cleared")))
}

/// `GET /cart/{customer_id}/summary`: monetary summary using checkout math.
pub async fn cart_summary(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
) -> Result<Json<ApiResponse<CartSummary>>, ApiError> {
    let summary = state.service.cart_summary(customer_id).await?;
    Ok(Json(ApiResponse::ok("Cart summary computed", summary)))
}
