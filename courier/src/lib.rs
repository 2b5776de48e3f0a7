//! # Pazar Courier Service
//!
//! Real-time courier operations for the marketplace:
//!
//! - **Registry**: courier CRUD, status and online flags, service areas,
//!   weekly working hours, performance stats
//! - **Dispatch**: consumes `order.paid`, selects a courier under
//!   admission control within a 1 s deadline: proximity first (Haversine
//!   ranking with rating tiebreaks), round-robin fallback, manual override;
//!   assignment, courier flip and `courier.assigned` event land in one
//!   transaction
//! - **Location ingestion**: per-courier rate limiting, 10 m movement
//!   debounce, bounded queue, batched persistence, TTL'd current-location
//!   cache and per-order live tracking fan-out
//!
//! The HTTP surface is a thin axum layer over [`service::CourierService`],
//! [`dispatch::Dispatcher`] and [`ingest::LocationIngestor`].

#![forbid(unsafe_code)]

pub mod api;
pub mod cache;
pub mod config;
pub mod consumer;
pub mod dispatch;
pub mod error;
pub mod eta;
pub mod ingest;
pub mod limiter;
pub mod router;
pub mod service;
pub mod state;
pub mod stores;
pub mod types;

pub use config::CourierConfig;
pub use dispatch::{DispatchConfig, Dispatcher};
pub use error::{CourierError, Result};
pub use service::CourierService;
