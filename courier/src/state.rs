//! Shared application state for HTTP handlers.

use crate::dispatch::Dispatcher;
use crate::ingest::LocationIngestor;
use crate::service::CourierService;
use std::sync::Arc;

/// State handed to every handler by axum.
#[derive(Clone)]
pub struct AppState {
    /// Courier registry and assignment lifecycle.
    pub registry: Arc<CourierService>,
    /// Dispatch engine.
    pub dispatcher: Arc<Dispatcher>,
    /// Location ingestion pipeline.
    pub ingestor: Arc<LocationIngestor>,
}
