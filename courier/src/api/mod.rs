//! HTTP handlers for the courier service.

pub mod assignments;
pub mod couriers;
pub mod locations;

use crate::error::CourierError;
use pazar_web::ApiError;

impl From<CourierError> for ApiError {
    fn from(err: CourierError) -> Self {
        match err {
            CourierError::Validation(_) | CourierError::InvalidAssignmentTransition { .. } => {
                Self::bad_request(err.to_string())
            }
            CourierError::NotFound(resource) => Self::not_found(resource),
            CourierError::AlreadyAssigned => Self::conflict(err.to_string()),
            CourierError::RateLimitExceeded => Self::too_many_requests(err.to_string()),
            CourierError::QueueFull => Self::unavailable(err.to_string()),
            CourierError::Database(_)
            | CourierError::Cache(_)
            | CourierError::EventSerialization(_) => Self::internal(err.to_string()),
        }
    }
}
