//! Shared application state for HTTP handlers.

use crate::service::OrderService;
use std::sync::Arc;

/// State handed to every handler by axum.
#[derive(Clone)]
pub struct AppState {
    /// The order service facade.
    pub service: Arc<OrderService>,
}
