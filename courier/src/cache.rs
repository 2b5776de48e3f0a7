//! Current-location cache and live tracking fan-out.
//!
//! The cache holds one entry per courier under `courier:location:{id}` with
//! a TTL equal to the freshness window; absence of a fresh entry means the
//! courier is not dispatchable. The cache also maps couriers to their active
//! order (`courier:active_order:{id}`) and publishes live tracking messages
//! on the per-order channel `courier:location:{order_id}`.

use crate::error::{CourierError, Result};
use crate::types::{CourierLocationSnapshot, TrackingUpdate};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Cache-backed location state, as seen by the ingestor, the dispatcher and
/// the read path.
#[async_trait]
pub trait LocationCache: Send + Sync {
    /// Overwrite the courier's current location with a TTL.
    async fn set_location(
        &self,
        courier_id: Uuid,
        snapshot: &CourierLocationSnapshot,
        ttl: Duration,
    ) -> Result<()>;

    /// The courier's current location, if the entry is still fresh.
    async fn get_location(&self, courier_id: Uuid) -> Result<Option<CourierLocationSnapshot>>;

    /// Whether a fresh entry exists for the courier.
    async fn has_location(&self, courier_id: Uuid) -> Result<bool>;

    /// Couriers whose cache entry expires within `within`. The janitor
    /// marks them offline.
    async fn expiring_couriers(&self, within: Duration) -> Result<Vec<Uuid>>;

    /// The order the courier is currently carrying, if any.
    async fn active_order(&self, courier_id: Uuid) -> Result<Option<Uuid>>;

    /// Record the courier's active order.
    async fn set_active_order(&self, courier_id: Uuid, order_id: Uuid) -> Result<()>;

    /// Clear the courier's active order.
    async fn clear_active_order(&self, courier_id: Uuid) -> Result<()>;

    /// Publish a live tracking message on the order's channel.
    async fn publish_tracking(&self, order_id: Uuid, update: &TrackingUpdate) -> Result<()>;
}

fn location_key(courier_id: Uuid) -> String {
    format!("courier:location:{courier_id}")
}

fn active_order_key(courier_id: Uuid) -> String {
    format!("courier:active_order:{courier_id}")
}

fn tracking_channel(order_id: Uuid) -> String {
    format!("courier:location:{order_id}")
}

// ============================================================================
// Redis
// ============================================================================

/// Redis-backed location cache.
#[derive(Clone)]
pub struct RedisLocationCache {
    conn: ConnectionManager,
}

impl RedisLocationCache {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns [`CourierError::Cache`] if the connection cannot be
    /// established.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| CourierError::cache("Failed to create Redis client", e))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| CourierError::cache("Failed to connect to Redis", e))?;
        Ok(Self { conn })
    }

    /// Walk all location keys with SCAN (never KEYS; this runs against a
    /// live instance).
    async fn scan_location_keys(&self) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg("courier:location:*")
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(|e| CourierError::cache("Failed to scan location keys", e))?;

            keys.extend(batch);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        Ok(keys)
    }
}

#[async_trait]
impl LocationCache for RedisLocationCache {
    async fn set_location(
        &self,
        courier_id: Uuid,
        snapshot: &CourierLocationSnapshot,
        ttl: Duration,
    ) -> Result<()> {
        let payload = serde_json::to_string(snapshot)
            .map_err(|e| CourierError::cache("Failed to serialize location snapshot", e))?;
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(location_key(courier_id), payload, ttl.as_secs())
            .await
            .map_err(|e| CourierError::cache("Failed to cache location", e))?;
        Ok(())
    }

    async fn get_location(&self, courier_id: Uuid) -> Result<Option<CourierLocationSnapshot>> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = conn
            .get(location_key(courier_id))
            .await
            .map_err(|e| CourierError::cache("Failed to read cached location", e))?;

        match payload {
            Some(payload) => serde_json::from_str(&payload)
                .map(Some)
                .map_err(|e| CourierError::cache("Corrupt cached location", e)),
            None => Ok(None),
        }
    }

    async fn has_location(&self, courier_id: Uuid) -> Result<bool> {
        let mut conn = self.conn.clone();
        conn.exists(location_key(courier_id))
            .await
            .map_err(|e| CourierError::cache("Failed to check cached location", e))
    }

    async fn expiring_couriers(&self, within: Duration) -> Result<Vec<Uuid>> {
        let keys = self.scan_location_keys().await?;
        let mut conn = self.conn.clone();
        let mut expiring = Vec::new();

        for key in keys {
            let ttl: i64 = conn
                .ttl(&key)
                .await
                .map_err(|e| CourierError::cache("Failed to read key TTL", e))?;
            // -2 = gone, -1 = no expiry; both are not "about to expire".
            if ttl >= 0 && (ttl as u64) < within.as_secs() {
                if let Some(id) = key
                    .strip_prefix("courier:location:")
                    .and_then(|s| Uuid::parse_str(s).ok())
                {
                    expiring.push(id);
                }
            }
        }

        Ok(expiring)
    }

    async fn active_order(&self, courier_id: Uuid) -> Result<Option<Uuid>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn
            .get(active_order_key(courier_id))
            .await
            .map_err(|e| CourierError::cache("Failed to read active order", e))?;
        Ok(value.and_then(|v| Uuid::parse_str(&v).ok()))
    }

    async fn set_active_order(&self, courier_id: Uuid, order_id: Uuid) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set(active_order_key(courier_id), order_id.to_string())
            .await
            .map_err(|e| CourierError::cache("Failed to set active order", e))?;
        Ok(())
    }

    async fn clear_active_order(&self, courier_id: Uuid) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .del(active_order_key(courier_id))
            .await
            .map_err(|e| CourierError::cache("Failed to clear active order", e))?;
        Ok(())
    }

    async fn publish_tracking(&self, order_id: Uuid, update: &TrackingUpdate) -> Result<()> {
        let payload = serde_json::to_string(update)
            .map_err(|e| CourierError::cache("Failed to serialize tracking update", e))?;
        let mut conn = self.conn.clone();
        let _: () = conn
            .publish(tracking_channel(order_id), payload)
            .await
            .map_err(|e| CourierError::cache("Failed to publish tracking update", e))?;
        Ok(())
    }
}

// ============================================================================
// In-memory
// ============================================================================

#[derive(Default)]
struct InMemoryCacheState {
    locations: HashMap<Uuid, (CourierLocationSnapshot, Instant)>,
    active_orders: HashMap<Uuid, Uuid>,
    tracking: Vec<(Uuid, TrackingUpdate)>,
}

/// In-memory location cache for tests. TTLs use tokio time, so paused-time
/// tests can expire entries deterministically.
#[derive(Clone, Default)]
pub struct InMemoryLocationCache {
    state: Arc<Mutex<InMemoryCacheState>>,
}

impl InMemoryLocationCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracking messages published so far, in publish order.
    #[must_use]
    pub fn tracking_messages(&self) -> Vec<(Uuid, TrackingUpdate)> {
        self.state.lock().expect("lock poisoned").tracking.clone()
    }
}

#[async_trait]
impl LocationCache for InMemoryLocationCache {
    async fn set_location(
        &self,
        courier_id: Uuid,
        snapshot: &CourierLocationSnapshot,
        ttl: Duration,
    ) -> Result<()> {
        self.state
            .lock()
            .expect("lock poisoned")
            .locations
            .insert(courier_id, (snapshot.clone(), Instant::now() + ttl));
        Ok(())
    }

    async fn get_location(&self, courier_id: Uuid) -> Result<Option<CourierLocationSnapshot>> {
        let state = self.state.lock().expect("lock poisoned");
        Ok(state
            .locations
            .get(&courier_id)
            .filter(|(_, expires)| *expires > Instant::now())
            .map(|(snapshot, _)| snapshot.clone()))
    }

    async fn has_location(&self, courier_id: Uuid) -> Result<bool> {
        Ok(self.get_location(courier_id).await?.is_some())
    }

    async fn expiring_couriers(&self, within: Duration) -> Result<Vec<Uuid>> {
        let state = self.state.lock().expect("lock poisoned");
        let horizon = Instant::now() + within;
        Ok(state
            .locations
            .iter()
            .filter(|(_, (_, expires))| *expires <= horizon)
            .map(|(id, _)| *id)
            .collect())
    }

    async fn active_order(&self, courier_id: Uuid) -> Result<Option<Uuid>> {
        Ok(self
            .state
            .lock()
            .expect("lock poisoned")
            .active_orders
            .get(&courier_id)
            .copied())
    }

    async fn set_active_order(&self, courier_id: Uuid, order_id: Uuid) -> Result<()> {
        self.state
            .lock()
            .expect("lock poisoned")
            .active_orders
            .insert(courier_id, order_id);
        Ok(())
    }

    async fn clear_active_order(&self, courier_id: Uuid) -> Result<()> {
        self.state
            .lock()
            .expect("lock poisoned")
            .active_orders
            .remove(&courier_id);
        Ok(())
    }

    async fn publish_tracking(&self, order_id: Uuid, update: &TrackingUpdate) -> Result<()> {
        self.state
            .lock()
            .expect("lock poisoned")
            .tracking
            .push((order_id, update.clone()));
        Ok(())
    }
}
