// Queue inspection routes
//
// Read-only view of the two crawl queues for operators.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use placecrawl_durable::{JobInfo, JobQueue, QueueStats};
use placecrawl_worker::{DISCOVERY_QUEUE, VISIT_QUEUE};

use super::common::{internal_error, not_found, ApiError, ListResponse};

const DEFAULT_FAILED_LIMIT: usize = 50;
const MAX_FAILED_LIMIT: usize = 500;

/// Job counts per status
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QueueStatsResponse {
    pub queue: String,
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
}

impl QueueStatsResponse {
    fn new(queue: &str, stats: QueueStats) -> Self {
        Self {
            queue: queue.to_string(),
            waiting: stats.waiting,
            active: stats.active,
            completed: stats.completed,
            failed: stats.failed,
        }
    }
}

/// A terminally failed job
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FailedJob {
    pub id: Uuid,
    /// Job type, e.g. "visit_place".
    pub job_type: String,
    /// Job payload as enqueued.
    pub data: serde_json::Value,
    /// Attempts made before giving up.
    pub attempts: u32,
    pub last_error: Option<String>,
    /// One entry per failed attempt, oldest first.
    pub error_history: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub failed_at: DateTime<Utc>,
}

impl From<JobInfo> for FailedJob {
    fn from(job: JobInfo) -> Self {
        Self {
            id: job.id,
            job_type: job.job_type,
            data: job.data,
            attempts: job.attempt,
            last_error: job.last_error,
            error_history: job.error_history,
            created_at: job.created_at,
            failed_at: job.updated_at,
        }
    }
}

/// Query parameters for failed jobs
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FailedQuery {
    /// Maximum number of jobs to return (default 50, max 500).
    pub limit: Option<usize>,
}

/// App state for queue routes
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<dyn JobQueue>,
}

impl AppState {
    pub fn new(queue: Arc<dyn JobQueue>) -> Self {
        Self { queue }
    }
}

/// Create queue routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/queues/:queue/stats", get(queue_stats))
        .route("/v1/queues/:queue/failed", get(list_failed))
        .with_state(state)
}

fn known_queue(queue: &str) -> Result<(), ApiError> {
    if queue == DISCOVERY_QUEUE || queue == VISIT_QUEUE {
        Ok(())
    } else {
        Err(not_found(format!("queue {queue} not found")))
    }
}

/// GET /v1/queues/{queue}/stats - Job counts for a queue
#[utoipa::path(
    get,
    path = "/v1/queues/{queue}/stats",
    params(
        ("queue" = String, Path, description = "Queue name: discovery or visit")
    ),
    responses(
        (status = 200, description = "Queue statistics", body = QueueStatsResponse),
        (status = 404, description = "Unknown queue", body = super::ErrorResponse),
        (status = 500, description = "Internal server error", body = super::ErrorResponse)
    ),
    tag = "queues"
)]
pub async fn queue_stats(
    State(state): State<AppState>,
    Path(queue): Path<String>,
) -> Result<Json<QueueStatsResponse>, ApiError> {
    known_queue(&queue)?;
    let stats = state
        .queue
        .stats(&queue)
        .await
        .map_err(|e| internal_error("Failed to get queue stats", e))?;
    Ok(Json(QueueStatsResponse::new(&queue, stats)))
}

/// GET /v1/queues/{queue}/failed - Most recently failed jobs
#[utoipa::path(
    get,
    path = "/v1/queues/{queue}/failed",
    params(
        ("queue" = String, Path, description = "Queue name: discovery or visit"),
        FailedQuery
    ),
    responses(
        (status = 200, description = "Failed jobs, newest first", body = ListResponse<FailedJob>),
        (status = 404, description = "Unknown queue", body = super::ErrorResponse),
        (status = 500, description = "Internal server error", body = super::ErrorResponse)
    ),
    tag = "queues"
)]
pub async fn list_failed(
    State(state): State<AppState>,
    Path(queue): Path<String>,
    Query(query): Query<FailedQuery>,
) -> Result<Json<ListResponse<FailedJob>>, ApiError> {
    known_queue(&queue)?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_FAILED_LIMIT)
        .clamp(1, MAX_FAILED_LIMIT);
    let jobs = state
        .queue
        .list_failed(&queue, limit)
        .await
        .map_err(|e| internal_error("Failed to list failed jobs", e))?;
    Ok(Json(ListResponse::new(
        jobs.into_iter().map(FailedJob::from).collect(),
    )))
}
