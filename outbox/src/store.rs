//! Outbox storage: the trait the publisher reads through, plus the
//! PostgreSQL and in-memory implementations.

use crate::event::OutboxEvent;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

/// Storage failure while reading or updating the outbox.
#[derive(Debug, Error, Clone)]
#[error("Outbox storage error: {0}")]
pub struct OutboxError(pub String);

/// Result alias for outbox storage operations.
pub type Result<T> = std::result::Result<T, OutboxError>;

/// Read/maintenance side of a service's outbox table.
///
/// The write side is not here on purpose: event rows must be inserted by the
/// service's own aggregate store, inside the aggregate's transaction.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Oldest unpublished events, in `created_at` order.
    async fn fetch_unpublished(&self, limit: i64) -> Result<Vec<OutboxEvent>>;

    /// Mark a batch of events published, in one statement.
    async fn mark_published(&self, ids: &[Uuid]) -> Result<()>;

    /// Delete published events older than `cutoff`; returns how many went.
    async fn delete_published_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

// ============================================================================
// PostgreSQL
// ============================================================================

#[derive(sqlx::FromRow)]
struct OutboxRow {
    id: Uuid,
    aggregate_id: Uuid,
    event_type: String,
    event_data: serde_json::Value,
    published: bool,
    created_at: DateTime<Utc>,
    published_at: Option<DateTime<Utc>>,
}

impl From<OutboxRow> for OutboxEvent {
    fn from(row: OutboxRow) -> Self {
        Self {
            id: row.id,
            aggregate_id: row.aggregate_id,
            event_type: row.event_type,
            event_data: row.event_data,
            published: row.published,
            created_at: row.created_at,
            published_at: row.published_at,
        }
    }
}

/// PostgreSQL outbox store over a service's `outbox_events` table.
#[derive(Clone)]
pub struct PostgresOutboxStore {
    pool: PgPool,
}

impl PostgresOutboxStore {
    /// Create a store over a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OutboxStore for PostgresOutboxStore {
    async fn fetch_unpublished(&self, limit: i64) -> Result<Vec<OutboxEvent>> {
        let rows: Vec<OutboxRow> = sqlx::query_as(
            "SELECT id, aggregate_id, event_type, event_data, published, created_at, published_at
             FROM outbox_events WHERE published = false
             ORDER BY created_at LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| OutboxError(format!("Failed to fetch unpublished events: {e}")))?;

        Ok(rows.into_iter().map(OutboxEvent::from).collect())
    }

    async fn mark_published(&self, ids: &[Uuid]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        sqlx::query(
            "UPDATE outbox_events SET published = true, published_at = now()
             WHERE id = ANY($1)",
        )
        .bind(ids)
        .execute(&self.pool)
        .await
        .map_err(|e| OutboxError(format!("Failed to mark events published: {e}")))?;
        Ok(())
    }

    async fn delete_published_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM outbox_events WHERE published = true AND published_at < $1")
                .bind(cutoff)
                .execute(&self.pool)
                .await
                .map_err(|e| OutboxError(format!("Failed to delete old events: {e}")))?;

        Ok(result.rows_affected())
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// In-memory outbox store. Clones share the same log, so a producing store
/// and the publisher can be wired to one log in tests.
#[derive(Clone, Default)]
pub struct InMemoryOutboxStore {
    events: Arc<Mutex<Vec<OutboxEvent>>>,
}

impl InMemoryOutboxStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event, as a producing store would inside its transaction.
    pub fn push(&self, event: OutboxEvent) {
        self.events.lock().expect("lock poisoned").push(event);
    }

    /// All rows, in insertion order.
    #[must_use]
    pub fn rows(&self) -> Vec<OutboxEvent> {
        self.events.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn fetch_unpublished(&self, limit: i64) -> Result<Vec<OutboxEvent>> {
        let events = self.events.lock().expect("lock poisoned");
        Ok(events
            .iter()
            .filter(|e| !e.published)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn mark_published(&self, ids: &[Uuid]) -> Result<()> {
        let mut events = self.events.lock().expect("lock poisoned");
        let now = Utc::now();
        for event in events.iter_mut() {
            if ids.contains(&event.id) {
                event.published = true;
                event.published_at = Some(now);
            }
        }
        Ok(())
    }

    async fn delete_published_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut events = self.events.lock().expect("lock poisoned");
        let before = events.len();
        events.retain(|e| !(e.published && e.published_at.is_some_and(|t| t < cutoff)));
        Ok((before - events.len()) as u64)
    }
}
