// Worker configuration
// Decision: Environment only, every value has a default so a bare `cargo run` works
// Decision: Retry policies are declared once per job type in CrawlPolicies

use std::str::FromStr;
use std::time::Duration;

use uuid::Uuid;

use placecrawl_durable::{BackoffKind, RetryPolicy};

/// Retry policies for each job type of the crawl
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlPolicies {
    /// Discovery hits the rate-sensitive list operation; a single attempt by
    /// default, with a slow backoff when retries are enabled
    pub discovery: RetryPolicy,
    pub visit: RetryPolicy,
    /// Total attempts a visit gets when the store fails
    pub persistence_max_attempts: u32,
}

impl Default for CrawlPolicies {
    fn default() -> Self {
        Self {
            discovery: RetryPolicy::exponential(1, Duration::from_secs(30)),
            visit: RetryPolicy::exponential(3, Duration::from_secs(1)),
            persistence_max_attempts: 3,
        }
    }
}

/// Configuration for the crawl worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Worker ID, shared by both pools
    pub worker_id: String,

    /// PostgreSQL URL; None means in-memory storage
    pub database_url: Option<String>,

    /// Base URL of the extraction service
    pub extractor_url: String,

    /// Per-request timeout for the extraction service
    pub extractor_timeout: Duration,

    /// Maximum concurrent discovery jobs
    pub discovery_concurrency: usize,

    /// Maximum concurrent visit jobs
    pub visit_concurrency: usize,

    /// How long a leased job may run before it becomes claimable again
    pub lease_timeout: Duration,

    pub policies: CrawlPolicies,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", Uuid::now_v7()),
            database_url: None,
            extractor_url: "http://127.0.0.1:3001".to_string(),
            extractor_timeout: Duration::from_secs(60),
            discovery_concurrency: 1,
            visit_concurrency: 5,
            lease_timeout: Duration::from_secs(120),
            policies: CrawlPolicies::default(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from any key lookup; unset or unparseable keys keep defaults
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let secs = |key: &str| parsed::<u64>(lookup(key)).map(Duration::from_secs);

        // <PREFIX>_MAX_ATTEMPTS, <PREFIX>_BACKOFF and <PREFIX>_BACKOFF_BASE_MS
        let policy = |prefix: &str, default: &RetryPolicy| {
            RetryPolicy::new(
                parsed::<u32>(lookup(&format!("{prefix}_MAX_ATTEMPTS")))
                    .unwrap_or(default.max_attempts),
                lookup(&format!("{prefix}_BACKOFF"))
                    .and_then(|s| s.parse::<BackoffKind>().ok())
                    .unwrap_or(default.backoff),
                parsed::<u64>(lookup(&format!("{prefix}_BACKOFF_BASE_MS")))
                    .map(Duration::from_millis)
                    .unwrap_or(default.base_delay),
            )
        };

        let policies = CrawlPolicies {
            discovery: policy("DISCOVERY", &defaults.policies.discovery),
            visit: policy("VISIT", &defaults.policies.visit),
            persistence_max_attempts: parsed::<u32>(lookup("PERSISTENCE_MAX_ATTEMPTS"))
                .unwrap_or(defaults.policies.persistence_max_attempts),
        };

        Self {
            worker_id: lookup("WORKER_ID").unwrap_or(defaults.worker_id),
            database_url: lookup("DATABASE_URL").filter(|s| !s.is_empty()),
            extractor_url: lookup("EXTRACTOR_URL").unwrap_or(defaults.extractor_url),
            extractor_timeout: secs("EXTRACTOR_TIMEOUT_SECS").unwrap_or(defaults.extractor_timeout),
            discovery_concurrency: parsed::<usize>(lookup("DISCOVERY_CONCURRENCY"))
                .map(|n| n.max(1))
                .unwrap_or(defaults.discovery_concurrency),
            visit_concurrency: parsed::<usize>(lookup("VISIT_CONCURRENCY"))
                .map(|n| n.max(1))
                .unwrap_or(defaults.visit_concurrency),
            lease_timeout: secs("LEASE_TIMEOUT_SECS").unwrap_or(defaults.lease_timeout),
            policies,
        }
    }
}

fn parsed<T: FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|v| v.trim().parse().ok())
}
