use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use order_ingest::api;
use order_ingest::cache::BoundedCache;
use order_ingest::config::Config;
use order_ingest::messaging::RedpandaSource;
use order_ingest::metrics::Metrics;
use order_ingest::pipeline::{warm_cache, IngestionLoop, ReadPath};
use order_ingest::store::PostgresOrderStore;
use order_ingest::utils::{retry_with_backoff, RetryConfig};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_ingest=debug"))
        )
        .init();

    tracing::info!("🚀 Starting order ingestion service");

    // === 1. Load configuration ===
    let config = Config::from_env()?;
    tracing::info!(
        topic = %config.kafka_topic,
        group_id = %config.kafka_group_id,
        cache_capacity = config.cache_capacity,
        "Configuration loaded"
    );

    // === 2. Connect to PostgreSQL (retry while it boots) ===
    tracing::info!("Connecting to PostgreSQL...");
    let store = retry_with_backoff(&RetryConfig::startup(), "postgres_connect", |_attempt| {
        PostgresOrderStore::connect(&config.database_url, config.db_max_connections)
    })
    .await?;
    store.ensure_schema().await?;
    let store = Arc::new(store);

    // === 3. Initialize Prometheus metrics ===
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    // === 4. Build and warm the cache ===
    let cache = Arc::new(BoundedCache::new(config.cache_capacity));
    warm_cache(&cache, store.as_ref(), config.cache_warm).await?;
    metrics.cache_entries.set(cache.len() as i64);

    // === 5. Subscribe to Redpanda ===
    let source = RedpandaSource::new(&config.kafka_brokers, &config.kafka_group_id, &config.kafka_topic)?;

    // === 6. Start the ingestion loop ===
    let shutdown = CancellationToken::new();
    let ingest = IngestionLoop::new(source, store.clone(), cache.clone(), metrics.clone())
        .with_receive_backoff(config.receive_backoff);
    let ingest_task = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { ingest.run(shutdown).await }
    });

    // === 7. Start the HTTP server ===
    let reads = ReadPath::new(cache.clone(), store.clone(), metrics.clone());
    let server = api::serve(&config, reads, metrics.clone())?;
    let server_handle = server.handle();
    let mut server_task = actix_web::rt::spawn(server);

    // === 8. Run until a signal or the server exits ===
    tokio::select! {
        _ = shutdown_signal() => {}
        result = &mut server_task => {
            match result {
                Ok(Ok(())) => tracing::warn!("HTTP server exited unexpectedly"),
                Ok(Err(e)) => tracing::error!(error = %e, "HTTP server failed"),
                Err(e) => tracing::error!(error = %e, "HTTP server task panicked"),
            }
        }
    }

    tracing::info!("🛑 Shutting down");
    shutdown.cancel();
    server_handle.stop(true).await;

    match ingest_task.await {
        Ok(stats) => tracing::info!(
            received = stats.received,
            acknowledged = stats.acknowledged,
            dropped = stats.dropped,
            released = stats.released,
            ack_failures = stats.ack_failures,
            "Ingestion loop drained"
        ),
        Err(e) => tracing::error!(error = %e, "Ingestion task failed"),
    }

    store.close().await;
    tracing::info!("👋 Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}
