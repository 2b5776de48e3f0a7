//! HTTP handlers for the order service.
//!
//! Thin translation layer: extract, call the service, wrap the result.
//! Error mapping to status codes lives in the [`From`] impl below.

pub mod carts;
pub mod orders;

use crate::error::OrderError;
use pazar_web::ApiError;

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::EmptyCart
            | OrderError::MultiSellerCart
            | OrderError::InvalidTransition { .. }
            | OrderError::Validation(_) => Self::bad_request(err.to_string()),
            OrderError::NotFound(resource) => Self::not_found(resource),
            OrderError::Conflict(message) => Self::conflict(message),
            OrderError::Database(_) | OrderError::EventSerialization(_) => {
                Self::internal(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OrderStatus;
    use axum::http::StatusCode;

    #[test]
    fn invalid_transition_maps_to_400() {
        let err: ApiError = OrderError::InvalidTransition {
            from: OrderStatus::Created,
            to: OrderStatus::Delivered,
        }
        .into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn not_found_maps_to_404() {
        let err: ApiError = OrderError::NotFound("Order").into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn database_failures_map_to_500() {
        let err: ApiError = OrderError::Database("connection reset".into()).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
