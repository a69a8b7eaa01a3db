// Placecrawl API server
// Decision: Without DATABASE_URL the server runs in dev mode: in-memory storage
//           and the crawl pipeline inside this process

use std::sync::Arc;

use anyhow::{Context, Result};
use placecrawl_core::telemetry::{init_telemetry, TelemetryConfig};
use placecrawl_control_plane::{build_app, ServerConfig, Services};
use placecrawl_storage::StorageBackend;
use placecrawl_worker::{AreaSubmitter, CrawlPipeline, HttpExtractorFactory, WorkerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore errors if not found)
    let _ = dotenvy::dotenv();

    // Configure via environment variables:
    // - OTEL_SERVICE_NAME: Service name (default: "placecrawl-control-plane")
    // - OTEL_EXPORTER_OTLP_ENDPOINT: OTLP endpoint (e.g., "http://localhost:4317")
    // - RUST_LOG or LOG_LEVEL: Log filter
    let mut telemetry_config = TelemetryConfig::from_env("placecrawl-control-plane")
        .with_default_filter("placecrawl_control_plane=debug,placecrawl_worker=debug,tower_http=debug,info");
    telemetry_config.service_version = Some(env!("CARGO_PKG_VERSION").to_string());

    // Keep the guard alive for the lifetime of the application
    let _telemetry_guard = init_telemetry(telemetry_config);

    tracing::info!("placecrawl-api starting...");

    let config = ServerConfig::from_env();
    let worker_config = WorkerConfig::from_env();

    let backend = match &config.database_url {
        Some(url) => StorageBackend::postgres(url)
            .await
            .context("Failed to connect to database")?,
        None => {
            tracing::warn!("DATABASE_URL not set, running in dev mode with in-memory storage");
            StorageBackend::in_memory()
        }
    };
    let queue = backend.job_queue();
    queue.open().await.context("Failed to open job queue")?;

    // Dev mode has no separate worker process to share the queue with
    let pipeline = if backend.is_dev_mode() {
        let extractors = HttpExtractorFactory::new(
            &worker_config.extractor_url,
            worker_config.extractor_timeout,
        )
        .context("Failed to create extractor client")?;
        let pipeline = CrawlPipeline::new(
            queue.clone(),
            backend.places(),
            backend.areas(),
            Arc::new(extractors),
            &worker_config,
        );
        pipeline
            .start()
            .await
            .context("Failed to start in-process crawl pipeline")?;
        tracing::info!(extractor_url = %worker_config.extractor_url, "In-process crawl pipeline started");
        Some(pipeline)
    } else {
        None
    };

    let services = Services {
        submitter: AreaSubmitter::new(
            queue.clone(),
            backend.areas(),
            worker_config.policies.discovery.clone(),
        ),
        areas: backend.areas(),
        places: backend.places(),
        queue: queue.clone(),
        storage: if backend.is_dev_mode() {
            "memory"
        } else {
            "postgres"
        },
    };

    if !config.api_prefix.is_empty() {
        tracing::info!(prefix = %config.api_prefix, "API prefix configured");
    }
    if config.cors_origins.is_empty() {
        tracing::info!("CORS not configured (same-origin requests only)");
    } else {
        tracing::info!(origins = ?config.cors_origins, "CORS origins configured");
    }

    let app = build_app(services, &config);

    let listener = tokio::net::TcpListener::bind(&config.api_addr)
        .await
        .context("Failed to bind to address")?;
    tracing::info!("HTTP server listening on {}", config.api_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Received shutdown signal");
        })
        .await
        .context("Server error")?;

    if let Some(pipeline) = pipeline {
        if let Err(e) = pipeline.shutdown().await {
            tracing::warn!(error = %e, "Crawl pipeline did not drain before shutdown");
        }
    }
    queue.close().await.context("Failed to close job queue")?;

    Ok(())
}
