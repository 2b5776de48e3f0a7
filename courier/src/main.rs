//! Courier service binary: wires config, stores, the cache, the event bus
//! and background tasks, then serves HTTP until shutdown.

use pazar_core::EventBus;
use pazar_courier::cache::RedisLocationCache;
use pazar_courier::config::CourierConfig;
use pazar_courier::consumer::PaidOrderConsumer;
use pazar_courier::dispatch::Dispatcher;
use pazar_courier::ingest::LocationIngestor;
use pazar_courier::router::build_router;
use pazar_courier::service::CourierService;
use pazar_courier::state::AppState;
use pazar_courier::stores::postgres::{
    migrate, PostgresAssignmentStore, PostgresCourierStore, PostgresLocationStore,
};
use pazar_outbox::{OutboxJanitor, OutboxPublisher, PostgresOutboxStore};
use pazar_redpanda::RedpandaEventBus;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = CourierConfig::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(config.postgres.max_connections)
        .connect(&config.postgres.url)
        .await?;
    migrate(&pool).await?;

    let cache = Arc::new(RedisLocationCache::connect(&config.redis.url).await?);
    let bus: Arc<dyn EventBus> = Arc::new(RedpandaEventBus::new(&config.redpanda.brokers)?);

    let couriers = Arc::new(PostgresCourierStore::new(pool.clone()));
    let assignments = Arc::new(PostgresAssignmentStore::new(pool.clone()));
    let locations = Arc::new(PostgresLocationStore::new(pool.clone()));
    let outbox = Arc::new(PostgresOutboxStore::new(pool));

    let registry = Arc::new(CourierService::new(
        couriers.clone(),
        assignments.clone(),
        locations.clone(),
        cache.clone(),
        config.registry(),
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        couriers.clone(),
        assignments.clone(),
        cache.clone(),
        config.dispatch.clone(),
    ));
    let ingestor = Arc::new(LocationIngestor::new(
        locations,
        cache,
        couriers,
        config.ingest.clone(),
    ));

    let (shutdown_tx, _) = broadcast::channel(1);

    let batcher_handle = ingestor.spawn_batcher(shutdown_tx.subscribe());
    let location_janitor_handle = ingestor.spawn_janitor(shutdown_tx.subscribe());

    let consumer = PaidOrderConsumer::new(bus.clone(), dispatcher.clone(), assignments);
    let consumer_handle = consumer.spawn(shutdown_tx.subscribe());

    let publisher = OutboxPublisher::new(
        outbox.clone(),
        bus,
        Duration::from_secs(config.outbox.process_interval_secs),
        config.outbox.batch_size,
    );
    let publisher_handle = publisher.spawn(shutdown_tx.subscribe());

    let outbox_janitor = OutboxJanitor::new(
        outbox,
        Duration::from_secs(config.outbox.retention_hours * 3600),
        Duration::from_secs(config.outbox.janitor_interval_secs),
    );
    let outbox_janitor_handle = outbox_janitor.spawn(shutdown_tx.subscribe());

    let app = build_router(AppState {
        registry,
        dispatcher,
        ingestor,
    });
    let listener =
        tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
    info!(
        address = %format!("{}:{}", config.server.host, config.server.port),
        "Courier service listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped, draining background tasks");
    let _ = shutdown_tx.send(());

    let grace = Duration::from_secs(config.server.shutdown_timeout);
    for (name, handle) in [
        ("location batcher", batcher_handle),
        ("location janitor", location_janitor_handle),
        ("paid-order consumer", consumer_handle),
        ("outbox publisher", publisher_handle),
        ("outbox janitor", outbox_janitor_handle),
    ] {
        match tokio::time::timeout(grace, handle).await {
            Ok(Ok(())) => info!(task = name, "Task stopped gracefully"),
            Ok(Err(e)) => warn!(task = name, error = %e, "Task failed"),
            Err(_) => warn!(task = name, "Task shutdown timed out"),
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C signal"),
        () = terminate => info!("Received SIGTERM signal"),
    }
}
