// Placecrawl Control Plane Library
// Decision: Shared library for binaries (API server, OpenAPI export) and router tests
// Decision: No auth layer; the API is meant to sit behind an authenticating proxy

use std::sync::Arc;

use axum::http::{header, Method};
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use placecrawl_core::{AreaStore, PlaceStore};
use placecrawl_durable::JobQueue;
use placecrawl_worker::AreaSubmitter;

// API routes and types (shared for OpenAPI generation)
pub mod api;

pub mod config;

// OpenAPI document generation
pub mod openapi;

pub use config::ServerConfig;
use openapi::ApiDoc;

/// Everything the routes need
#[derive(Clone)]
pub struct Services {
    pub submitter: AreaSubmitter,
    pub areas: Arc<dyn AreaStore>,
    pub places: Arc<dyn PlaceStore>,
    pub queue: Arc<dyn JobQueue>,
    /// "postgres" or "memory"
    pub storage: &'static str,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    storage: &'static str,
}

async fn health(State(storage): State<&'static str>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        storage,
    })
}

/// Build the full application router
pub fn build_app(services: Services, config: &ServerConfig) -> Router {
    let api_routes = Router::new()
        .merge(api::areas::routes(api::areas::AppState::new(
            services.submitter,
            services.areas,
        )))
        .merge(api::places::routes(api::places::AppState::new(
            services.places,
        )))
        .merge(api::queues::routes(api::queues::AppState::new(
            services.queue,
        )));

    // Health is never prefixed
    let app = Router::new()
        .route("/health", get(health).with_state(services.storage))
        .merge(build_router_with_prefix(api_routes, &config.api_prefix))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()));

    let app = if config.cors_origins.is_empty() {
        app
    } else {
        app.layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(config.cors_origins.clone()))
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::ORIGIN]),
        )
    };

    app.layer(TraceLayer::new_for_http())
}

/// Build router with optional API prefix
fn build_router_with_prefix<S: Clone + Send + Sync + 'static>(
    api_routes: Router<S>,
    api_prefix: &str,
) -> Router<S> {
    if api_prefix.is_empty() {
        api_routes
    } else {
        Router::new().nest(api_prefix, api_routes)
    }
}
