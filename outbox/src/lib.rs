//! # Pazar Outbox
//!
//! The transactional outbox machinery both services run.
//!
//! A service writes an [`OutboxEvent`] row inside the same database
//! transaction as the business change it records. A background
//! [`OutboxPublisher`] drains unpublished rows to the event bus in
//! `created_at` order and marks delivered rows published; an
//! [`OutboxJanitor`] prunes published rows past a retention window.
//!
//! # Guarantees
//!
//! - **At-least-once**: marking happens after publishing, so a crash between
//!   the two redelivers the event with the same `event_id` on restart;
//!   consumers dedupe on it
//! - **Per-aggregate ordering**: a failed publish blocks the rest of that
//!   aggregate's events for the tick; other aggregates keep flowing
//! - **No lost events**: an event row either commits with its business
//!   change or not at all
//!
//! Each service owns an `outbox_events` table with this shape:
//!
//! ```sql
//! CREATE TABLE outbox_events (
//!     id           UUID PRIMARY KEY,
//!     aggregate_id UUID NOT NULL,
//!     event_type   TEXT NOT NULL,
//!     event_data   JSONB NOT NULL,
//!     published    BOOLEAN NOT NULL DEFAULT false,
//!     created_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
//!     published_at TIMESTAMPTZ
//! );
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod event;
pub mod publisher;
pub mod store;

pub use event::OutboxEvent;
pub use publisher::{OutboxJanitor, OutboxPublisher};
pub use store::{InMemoryOutboxStore, OutboxError, OutboxStore, PostgresOutboxStore};
