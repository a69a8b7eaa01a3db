use std::sync::Arc;

use anyhow::{Context, Result};
use placecrawl_core::telemetry::{init_telemetry, TelemetryConfig};
use placecrawl_storage::StorageBackend;
use placecrawl_worker::{CrawlPipeline, HttpExtractorFactory, WorkerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore errors if not found)
    let _ = dotenvy::dotenv();

    // Configure via environment variables:
    // - OTEL_SERVICE_NAME: Service name (default: "placecrawl-worker")
    // - OTEL_EXPORTER_OTLP_ENDPOINT: OTLP endpoint (e.g., "http://localhost:4317")
    // - RUST_LOG or LOG_LEVEL: Log filter (default: "placecrawl_worker=debug")
    let telemetry_config = TelemetryConfig::from_env("placecrawl-worker")
        .with_default_filter("placecrawl_worker=debug,placecrawl_durable=info,info");

    // Keep the guard alive for the lifetime of the application
    let _telemetry_guard = init_telemetry(telemetry_config);

    let config = WorkerConfig::from_env();
    let database_url = config
        .database_url
        .clone()
        .context("DATABASE_URL must be set; workers share the queue through PostgreSQL")?;

    tracing::info!(
        worker_id = %config.worker_id,
        extractor_url = %config.extractor_url,
        discovery_concurrency = config.discovery_concurrency,
        visit_concurrency = config.visit_concurrency,
        "placecrawl-worker starting..."
    );

    let backend = StorageBackend::postgres(&database_url)
        .await
        .context("Failed to open storage")?;
    let queue = backend.job_queue();
    queue.open().await.context("Failed to open job queue")?;

    let extractors = HttpExtractorFactory::new(&config.extractor_url, config.extractor_timeout)
        .context("Failed to create extractor client")?;

    let pipeline = CrawlPipeline::new(
        queue.clone(),
        backend.places(),
        backend.areas(),
        Arc::new(extractors),
        &config,
    );
    pipeline
        .start()
        .await
        .context("Failed to start crawl pipeline")?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Received shutdown signal");

    if let Err(e) = pipeline.shutdown().await {
        tracing::warn!(error = %e, "Jobs still in flight at shutdown; their leases will expire");
    }
    queue.close().await.context("Failed to close job queue")?;

    tracing::info!("Worker shutdown complete");
    Ok(())
}
