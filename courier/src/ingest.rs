//! High-frequency location ingestion.
//!
//! The write path a courier app hits every few seconds:
//!
//! 1. **Rate limit**: one update per 2 s per courier (token bucket per
//!    courier, burst 1); refusals are surfaced to the client as 429
//! 2. **Debounce**: movement under 10 m from the last accepted sample is
//!    treated as a heartbeat: accepted silently, never persisted
//! 3. **Queue**: accepted samples go into a bounded channel; a full queue
//!    sheds load instead of blocking the handler
//! 4. **Batcher**: a background task drains the queue in batches (10
//!    samples or 100 ms), persisting each sample, refreshing the cache
//!    entry and fanning out to the order's live tracking channel
//! 5. **Janitor**: every 30 s, couriers whose cache entry is about to
//!    expire are marked offline and their limiters are dropped

use crate::cache::LocationCache;
use crate::error::{CourierError, Result};
use crate::limiter::TokenBucket;
use crate::stores::{CourierStore, LocationStore};
use crate::types::{
    CourierLocationSnapshot, CourierLocationUpdate, TrackingUpdate, UpdateLocationRequest,
};
use chrono::Utc;
use pazar_core::Location;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Location ingestion parameters.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Minimum spacing between accepted updates per courier.
    pub rate_limit_interval: Duration,
    /// Movement below this distance is a heartbeat, not a new sample.
    pub debounce_km: f64,
    /// Bounded queue capacity between handlers and the batcher.
    pub queue_capacity: usize,
    /// Samples per batch.
    pub batch_size: usize,
    /// Maximum time a partial batch waits.
    pub batch_interval: Duration,
    /// TTL on the cached current location.
    pub location_ttl: Duration,
    /// Time between janitor sweeps.
    pub janitor_interval: Duration,
    /// Couriers whose cache entry expires within this window are marked
    /// offline by the janitor.
    pub expiry_warning: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            rate_limit_interval: Duration::from_secs(2),
            debounce_km: 0.01,
            queue_capacity: 1000,
            batch_size: 10,
            batch_interval: Duration::from_millis(100),
            location_ttl: Duration::from_secs(300),
            janitor_interval: Duration::from_secs(30),
            expiry_warning: Duration::from_secs(60),
        }
    }
}

/// What happened to an accepted update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Enqueued for persistence and fan-out.
    Queued,
    /// Under the debounce threshold; acknowledged but not persisted.
    Debounced,
}

/// The location ingestion pipeline.
pub struct LocationIngestor {
    locations: Arc<dyn LocationStore>,
    cache: Arc<dyn LocationCache>,
    couriers: Arc<dyn CourierStore>,
    queue_tx: mpsc::Sender<CourierLocationUpdate>,
    queue_rx: Mutex<Option<mpsc::Receiver<CourierLocationUpdate>>>,
    limiters: RwLock<HashMap<Uuid, Arc<TokenBucket>>>,
    last_accepted: RwLock<HashMap<Uuid, Location>>,
    config: IngestConfig,
}

impl LocationIngestor {
    /// Wire the pipeline. Call [`Self::spawn_batcher`] and
    /// [`Self::spawn_janitor`] afterwards to start the background tasks.
    pub fn new(
        locations: Arc<dyn LocationStore>,
        cache: Arc<dyn LocationCache>,
        couriers: Arc<dyn CourierStore>,
        config: IngestConfig,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity);
        Self {
            locations,
            cache,
            couriers,
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
            limiters: RwLock::new(HashMap::new()),
            last_accepted: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Accept one location update from a courier.
    ///
    /// Applies the per-courier rate limit, the movement debounce and the
    /// bounded queue, in that order. The queue insert never blocks.
    pub async fn update_location(
        &self,
        courier_id: Uuid,
        req: UpdateLocationRequest,
    ) -> Result<IngestOutcome> {
        if !(-90.0..=90.0).contains(&req.latitude) {
            return Err(CourierError::Validation("latitude out of range".into()));
        }
        if !(-180.0..=180.0).contains(&req.longitude) {
            return Err(CourierError::Validation("longitude out of range".into()));
        }

        let limiter = self.limiter_for(courier_id);
        if !limiter.try_acquire() {
            return Err(CourierError::RateLimitExceeded);
        }

        let location = Location {
            latitude: req.latitude,
            longitude: req.longitude,
            address: req.address,
        };

        {
            let last_accepted = self.last_accepted.read().expect("lock poisoned");
            if let Some(previous) = last_accepted.get(&courier_id) {
                if previous.distance_km(&location) < self.config.debounce_km {
                    debug!(courier_id = %courier_id, "Location update debounced");
                    return Ok(IngestOutcome::Debounced);
                }
            }
        }

        let update = CourierLocationUpdate {
            courier_id,
            location,
            speed: req.speed,
            heading: req.heading,
            accuracy: req.accuracy,
            timestamp: Utc::now(),
        };

        match self.queue_tx.try_send(update) {
            Ok(()) => Ok(IngestOutcome::Queued),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(courier_id = %courier_id, "Location queue full, dropping update");
                Err(CourierError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(courier_id = %courier_id, "Location queue closed");
                Err(CourierError::QueueFull)
            }
        }
    }

    fn limiter_for(&self, courier_id: Uuid) -> Arc<TokenBucket> {
        if let Some(limiter) = self
            .limiters
            .read()
            .expect("lock poisoned")
            .get(&courier_id)
        {
            return Arc::clone(limiter);
        }

        let mut limiters = self.limiters.write().expect("lock poisoned");
        Arc::clone(limiters.entry(courier_id).or_insert_with(|| {
            Arc::new(TokenBucket::per_interval(
                self.config.rate_limit_interval,
                1.0,
            ))
        }))
    }

    /// Persist one sample: append-only row, cache refresh, debounce
    /// bookkeeping, and the live tracking fan-out when the courier carries
    /// an order.
    async fn process_update(&self, update: CourierLocationUpdate) -> Result<()> {
        // Cache freshness matters more than the history row; keep going if
        // the database write fails.
        if let Err(err) = self.locations.append(&update).await {
            warn!(
                courier_id = %update.courier_id,
                error = %err,
                "Failed to persist location, continuing with cache update"
            );
        }

        let snapshot = CourierLocationSnapshot {
            latitude: update.location.latitude,
            longitude: update.location.longitude,
            address: update.location.address.clone(),
            speed: update.speed,
            heading: update.heading,
            accuracy: update.accuracy,
            timestamp: update.timestamp,
        };
        self.cache
            .set_location(update.courier_id, &snapshot, self.config.location_ttl)
            .await?;

        self.last_accepted
            .write()
            .expect("lock poisoned")
            .insert(update.courier_id, update.location.clone());

        if let Some(order_id) = self.cache.active_order(update.courier_id).await? {
            let tracking = TrackingUpdate {
                order_id,
                courier_id: update.courier_id,
                latitude: update.location.latitude,
                longitude: update.location.longitude,
                heading: update.heading,
                speed: update.speed,
                accuracy: update.accuracy,
                timestamp: update.timestamp,
            };
            if let Err(err) = self.cache.publish_tracking(order_id, &tracking).await {
                warn!(order_id = %order_id, error = %err, "Failed to publish tracking update");
            } else {
                debug!(order_id = %order_id, "Published tracking update");
            }
        }

        Ok(())
    }

    async fn flush(&self, batch: &mut Vec<CourierLocationUpdate>) {
        let count = batch.len();
        for update in batch.drain(..) {
            let courier_id = update.courier_id;
            if let Err(err) = self.process_update(update).await {
                warn!(courier_id = %courier_id, error = %err, "Failed to process location update");
            }
        }
        if count > 0 {
            debug!(count = count, "Processed location batch");
        }
    }

    /// Spawn the queue-draining batcher.
    ///
    /// # Panics
    ///
    /// Panics if called twice; the queue has one consumer.
    pub fn spawn_batcher(self: &Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let ingestor = Arc::clone(self);
        let mut rx = self
            .queue_rx
            .lock()
            .expect("lock poisoned")
            .take()
            .expect("batcher already started");

        tokio::spawn(async move {
            info!(
                batch_size = ingestor.config.batch_size,
                "Location batcher started"
            );
            let mut batch: Vec<CourierLocationUpdate> =
                Vec::with_capacity(ingestor.config.batch_size);
            let mut ticker = tokio::time::interval(ingestor.config.batch_interval);

            loop {
                tokio::select! {
                    received = rx.recv() => match received {
                        Some(update) => {
                            batch.push(update);
                            if batch.len() >= ingestor.config.batch_size {
                                ingestor.flush(&mut batch).await;
                            }
                        }
                        None => {
                            ingestor.flush(&mut batch).await;
                            break;
                        }
                    },
                    _ = ticker.tick() => {
                        if !batch.is_empty() {
                            ingestor.flush(&mut batch).await;
                        }
                    }
                    _ = shutdown.recv() => {
                        // Finish what is already queued before stopping.
                        while let Ok(update) = rx.try_recv() {
                            batch.push(update);
                        }
                        ingestor.flush(&mut batch).await;
                        info!("Location batcher stopping");
                        break;
                    }
                }
            }
        })
    }

    /// One janitor sweep: couriers whose cache entry is about to expire go
    /// offline and lose their limiter and debounce state; limiters for
    /// couriers with no cache entry at all are collected too.
    pub async fn run_janitor_once(&self) {
        match self.cache.expiring_couriers(self.config.expiry_warning).await {
            Ok(expiring) => {
                for courier_id in &expiring {
                    if let Err(err) = self.couriers.set_online(*courier_id, false).await {
                        debug!(courier_id = %courier_id, error = %err, "Failed to mark courier offline");
                    }
                    self.forget(*courier_id);
                }
                if !expiring.is_empty() {
                    info!(count = expiring.len(), "Marked couriers with expiring locations offline");
                }
            }
            Err(err) => warn!(error = %err, "Failed to scan expiring locations"),
        }

        let tracked: Vec<Uuid> = self
            .limiters
            .read()
            .expect("lock poisoned")
            .keys()
            .copied()
            .collect();
        for courier_id in tracked {
            if matches!(self.cache.has_location(courier_id).await, Ok(false)) {
                self.forget(courier_id);
            }
        }
    }

    /// Drop a courier's limiter and debounce bookkeeping. Both rebuild on
    /// their next update.
    fn forget(&self, courier_id: Uuid) {
        self.limiters
            .write()
            .expect("lock poisoned")
            .remove(&courier_id);
        self.last_accepted
            .write()
            .expect("lock poisoned")
            .remove(&courier_id);
    }

    /// Spawn the janitor loop.
    pub fn spawn_janitor(self: &Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let ingestor = Arc::clone(self);
        tokio::spawn(async move {
            info!(
                interval_secs = ingestor.config.janitor_interval.as_secs(),
                "Location janitor started"
            );
            let mut ticker = tokio::time::interval(ingestor.config.janitor_interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => ingestor.run_janitor_once().await,
                    _ = shutdown.recv() => {
                        info!("Location janitor stopping");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryLocationCache;
    use crate::stores::{CourierStore, InMemoryCourierStore, LocationStore as _};
    use crate::types::{Courier, CourierStatus};
    use pazar_core::events::VehicleType;
    use rust_decimal_macros::dec;

    struct Fixture {
        ingestor: Arc<LocationIngestor>,
        couriers: InMemoryCourierStore,
        cache: InMemoryLocationCache,
    }

    fn fixture_with(config: IngestConfig) -> Fixture {
        let couriers = InMemoryCourierStore::new();
        let cache = InMemoryLocationCache::new();
        let ingestor = Arc::new(LocationIngestor::new(
            Arc::new(couriers.clone()),
            Arc::new(cache.clone()),
            Arc::new(couriers.clone()),
            config,
        ));
        Fixture {
            ingestor,
            couriers,
            cache,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(IngestConfig::default())
    }

    fn request(latitude: f64, longitude: f64) -> UpdateLocationRequest {
        UpdateLocationRequest {
            latitude,
            longitude,
            address: None,
            speed: Some(20.0),
            heading: Some(90.0),
            accuracy: Some(5.0),
        }
    }

    async fn register_courier(couriers: &InMemoryCourierStore) -> Uuid {
        let courier = Courier {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            first_name: "Test".to_string(),
            last_name: "Courier".to_string(),
            phone: "+905550000000".to_string(),
            email: "courier@example.com".to_string(),
            vehicle_type: VehicleType::Motorbike,
            vehicle_plate: None,
            status: CourierStatus::Active,
            rating: dec!(5.0),
            completed_orders: 0,
            is_online: true,
            last_seen_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        couriers.create(&courier).await.unwrap();
        courier.id
    }

    /// Let the batcher catch up under paused time.
    async fn settle() {
        for _ in 0..20 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn second_update_within_two_seconds_is_rate_limited() {
        let fixture = fixture();
        let courier_id = register_courier(&fixture.couriers).await;

        let first = fixture
            .ingestor
            .update_location(courier_id, request(41.0, 29.0))
            .await
            .unwrap();
        assert_eq!(first, IngestOutcome::Queued);

        tokio::time::advance(Duration::from_secs(1)).await;
        let second = fixture
            .ingestor
            .update_location(courier_id, request(41.01, 29.01))
            .await
            .unwrap_err();
        assert_eq!(second, CourierError::RateLimitExceeded);

        tokio::time::advance(Duration::from_secs(1)).await;
        let third = fixture
            .ingestor
            .update_location(courier_id, request(41.02, 29.02))
            .await
            .unwrap();
        assert_eq!(third, IngestOutcome::Queued);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limits_are_per_courier() {
        let fixture = fixture();
        let first = register_courier(&fixture.couriers).await;
        let second = register_courier(&fixture.couriers).await;

        assert!(fixture
            .ingestor
            .update_location(first, request(41.0, 29.0))
            .await
            .is_ok());
        assert!(
            fixture
                .ingestor
                .update_location(second, request(41.5, 29.5))
                .await
                .is_ok(),
            "another courier's bucket is untouched"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn small_movement_is_debounced_and_not_persisted() {
        let fixture = fixture();
        let courier_id = register_courier(&fixture.couriers).await;
        let (shutdown_tx, _) = broadcast::channel(1);
        let batcher = fixture.ingestor.spawn_batcher(shutdown_tx.subscribe());

        fixture
            .ingestor
            .update_location(courier_id, request(41.0, 29.0))
            .await
            .unwrap();
        settle().await;
        assert_eq!(
            fixture.ingestor.locations.history(courier_id, 10).await.unwrap().len(),
            1
        );

        // ~5 m north: a heartbeat, not a move.
        tokio::time::advance(Duration::from_secs(2)).await;
        let outcome = fixture
            .ingestor
            .update_location(courier_id, request(41.00005, 29.0))
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Debounced);

        // ~100 m north: a real move.
        tokio::time::advance(Duration::from_secs(2)).await;
        let outcome = fixture
            .ingestor
            .update_location(courier_id, request(41.001, 29.0))
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Queued);

        settle().await;
        assert_eq!(
            fixture.ingestor.locations.history(courier_id, 10).await.unwrap().len(),
            2,
            "the debounced sample never reached the store"
        );

        let _ = shutdown_tx.send(());
        let _ = batcher.await;
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_sheds_load() {
        let fixture = fixture_with(IngestConfig {
            queue_capacity: 1,
            ..IngestConfig::default()
        });
        // No batcher running: the queue cannot drain.
        let first = register_courier(&fixture.couriers).await;
        let second = register_courier(&fixture.couriers).await;

        assert!(fixture
            .ingestor
            .update_location(first, request(41.0, 29.0))
            .await
            .is_ok());
        let err = fixture
            .ingestor
            .update_location(second, request(41.5, 29.5))
            .await
            .unwrap_err();
        assert_eq!(err, CourierError::QueueFull);
    }

    #[tokio::test(start_paused = true)]
    async fn active_order_updates_fan_out_to_the_tracking_channel() {
        let fixture = fixture();
        let courier_id = register_courier(&fixture.couriers).await;
        let order_id = Uuid::new_v4();
        fixture.cache.set_active_order(courier_id, order_id).await.unwrap();

        let (shutdown_tx, _) = broadcast::channel(1);
        let batcher = fixture.ingestor.spawn_batcher(shutdown_tx.subscribe());

        fixture
            .ingestor
            .update_location(courier_id, request(41.0, 29.0))
            .await
            .unwrap();
        settle().await;

        let messages = fixture.cache.tracking_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, order_id);
        assert_eq!(messages[0].1.courier_id, courier_id);
        assert_eq!(messages[0].1.latitude, 41.0);

        let _ = shutdown_tx.send(());
        let _ = batcher.await;
    }

    #[tokio::test(start_paused = true)]
    async fn updates_without_an_active_order_do_not_fan_out() {
        let fixture = fixture();
        let courier_id = register_courier(&fixture.couriers).await;

        let (shutdown_tx, _) = broadcast::channel(1);
        let batcher = fixture.ingestor.spawn_batcher(shutdown_tx.subscribe());

        fixture
            .ingestor
            .update_location(courier_id, request(41.0, 29.0))
            .await
            .unwrap();
        settle().await;

        assert!(fixture.cache.tracking_messages().is_empty());

        let _ = shutdown_tx.send(());
        let _ = batcher.await;
    }

    #[tokio::test(start_paused = true)]
    async fn janitor_marks_expiring_couriers_offline_and_drops_limiters() {
        let fixture = fixture();
        let courier_id = register_courier(&fixture.couriers).await;

        // A cache entry with only 30 s left is inside the 60 s warning
        // window.
        fixture
            .cache
            .set_location(
                courier_id,
                &CourierLocationSnapshot {
                    latitude: 41.0,
                    longitude: 29.0,
                    address: None,
                    speed: None,
                    heading: None,
                    accuracy: None,
                    timestamp: Utc::now(),
                },
                Duration::from_secs(30),
            )
            .await
            .unwrap();

        fixture.ingestor.run_janitor_once().await;
        let courier = fixture.couriers.get(courier_id).await.unwrap().unwrap();
        assert!(!courier.is_online);

        // A courier with a limiter but no cache entry at all gets garbage
        // collected.
        let stale = register_courier(&fixture.couriers).await;
        fixture
            .ingestor
            .update_location(stale, request(41.0, 29.0))
            .await
            .unwrap();
        assert!(fixture
            .ingestor
            .limiters
            .read()
            .unwrap()
            .contains_key(&stale));

        fixture.ingestor.run_janitor_once().await;
        assert!(!fixture
            .ingestor
            .limiters
            .read()
            .unwrap()
            .contains_key(&stale));
    }

    #[tokio::test]
    async fn out_of_range_coordinates_are_rejected() {
        let fixture = fixture();
        let courier_id = register_courier(&fixture.couriers).await;

        let err = fixture
            .ingestor
            .update_location(courier_id, request(91.0, 29.0))
            .await
            .unwrap_err();
        assert!(matches!(err, CourierError::Validation(_)));

        let err = fixture
            .ingestor
            .update_location(courier_id, request(41.0, 181.0))
            .await
            .unwrap_err();
        assert!(matches!(err, CourierError::Validation(_)));
    }
}
