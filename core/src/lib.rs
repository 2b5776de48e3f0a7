//! # Pazar Core
//!
//! Shared domain vocabulary for the pazar marketplace backend.
//!
//! This crate contains everything both services (order and courier) need to
//! agree on without depending on each other:
//!
//! - [`event::EventEnvelope`]: the unit of publication: a typed, keyed,
//!   JSON-bodied event with a stable `event_id` for consumer deduplication
//! - [`event_bus::EventBus`]: the publish/subscribe abstraction implemented
//!   by `pazar-redpanda` (production) and `pazar-testing` (tests)
//! - [`geo`]: latitude/longitude locations and great-circle distance
//! - [`events`]: topic names and wire payload schemas for the `order.*`
//!   and `courier.assigned` topics
//!
//! # Delivery Semantics
//!
//! Events are delivered **at-least-once**. Producers write events to a
//! transactional outbox in the same database transaction as the business
//! change; a publisher loop drains the outbox to the bus. Consumers MUST be
//! idempotent, deduplicating on `event_id`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod event;
pub mod event_bus;
pub mod events;
pub mod geo;

pub use event::{EventEnvelope, EventError};
pub use event_bus::{EventBus, EventBusError, EventStream};
pub use geo::Location;
