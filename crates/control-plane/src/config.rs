// Server configuration
// Decision: Environment only; DATABASE_URL absent means dev mode with in-memory storage

use axum::http::HeaderValue;

/// Configuration for the API server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address
    pub api_addr: String,

    /// Prefix for all API routes, e.g. "/api" (health stays unprefixed)
    pub api_prefix: String,

    /// Allowed CORS origins; empty means same-origin only
    pub cors_origins: Vec<HeaderValue>,

    /// PostgreSQL URL; None runs everything in memory
    pub database_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_addr: "0.0.0.0:9000".to_string(),
            api_prefix: String::new(),
            cors_origins: Vec::new(),
            database_url: None,
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables
    ///
    /// - `API_ADDR`: listen address (default "0.0.0.0:9000")
    /// - `API_PREFIX`: route prefix (default none)
    /// - `CORS_ALLOWED_ORIGINS`: comma-separated origins
    /// - `DATABASE_URL`: PostgreSQL URL
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_addr: std::env::var("API_ADDR").unwrap_or(defaults.api_addr),
            api_prefix: std::env::var("API_PREFIX").unwrap_or_default(),
            cors_origins: std::env::var("CORS_ALLOWED_ORIGINS")
                .ok()
                .filter(|s| !s.is_empty())
                .map(|s| s.split(',').filter_map(|s| s.trim().parse().ok()).collect())
                .unwrap_or_default(),
            database_url: std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
        }
    }

    pub fn is_dev_mode(&self) -> bool {
        self.database_url.is_none()
    }
}
