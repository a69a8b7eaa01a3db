//! JobQueue trait definition

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::reliability::{duration_millis, RetryPolicy};

/// Error type for queue operations
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Job not found
    #[error("job not found: {0}")]
    JobNotFound(Uuid),

    /// The lease behind a token expired or was superseded
    #[error("lease lost for job {0}")]
    LeaseLost(Uuid),

    /// The queue client has been closed
    #[error("queue client is closed")]
    Closed,

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Job status in the queue
///
/// `Waiting → Active → {Completed | Waiting (after backoff) | Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Ready to be leased once `available_at` has passed
    Waiting,
    /// Leased by a worker
    Active,
    /// Acked
    Completed,
    /// Terminal failure, attempts exhausted or not retryable
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(Self::Waiting),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(QueueError::Serialization(format!(
                "unknown job status: {other}"
            ))),
        }
    }
}

/// Per-queue settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueOptions {
    /// Maximum number of concurrently active leases in this queue
    pub concurrency: usize,

    /// How long a lease stays valid without ack/nack
    #[serde(with = "duration_millis")]
    pub lease_timeout: Duration,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            lease_timeout: Duration::from_secs(120),
        }
    }
}

impl QueueOptions {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            ..Default::default()
        }
    }

    /// Set the lease timeout
    pub fn with_lease_timeout(mut self, timeout: Duration) -> Self {
        self.lease_timeout = timeout;
        self
    }
}

/// Job to be enqueued
///
/// Wire shape: `{type, data, attempts, backoffPolicy}` where the last two
/// live inside `policy`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    #[serde(rename = "type")]
    pub job_type: String,
    pub data: serde_json::Value,
    pub policy: RetryPolicy,
}

impl NewJob {
    pub fn new(job_type: impl Into<String>, data: serde_json::Value, policy: RetryPolicy) -> Self {
        Self {
            job_type: job_type.into(),
            data,
            policy,
        }
    }
}

/// Proof of a lease; required to ack or nack
///
/// `lease_id` changes on every lease, so a holder whose lease expired
/// cannot settle the job after someone else picked it up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeaseToken {
    pub job_id: Uuid,
    pub lease_id: Uuid,
}

/// A job that has been leased by a worker
#[derive(Debug, Clone)]
pub struct LeasedJob {
    pub token: LeaseToken,
    pub queue: String,
    pub job_type: String,
    pub data: serde_json::Value,
    /// 1-based attempt number of this delivery
    pub attempt: u32,
    pub max_attempts: u32,
    pub leased_until: DateTime<Utc>,
}

impl LeasedJob {
    pub fn id(&self) -> Uuid {
        self.token.job_id
    }

    pub fn is_final_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

/// How the queue should treat a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Retry while the job's policy has attempts left
    Retry,
    /// Retry, but never beyond this many attempts in total
    RetryUpTo(u32),
    /// Do not retry
    Terminal,
}

/// Outcome of nacking a job
#[derive(Debug, Clone, PartialEq)]
pub enum NackOutcome {
    /// Job is waiting again and becomes leasable after `delay`
    WillRetry { next_attempt: u32, delay: Duration },

    /// Job is terminally failed
    Failed { attempts: u32 },
}

/// Full job record for inspection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: Uuid,
    pub queue: String,
    pub job_type: String,
    pub data: serde_json::Value,
    pub policy: RetryPolicy,
    pub status: JobStatus,
    pub attempt: u32,
    pub last_error: Option<String>,
    pub error_history: Vec<String>,
    pub result: Option<serde_json::Value>,
    pub available_at: DateTime<Utc>,
    pub leased_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Job counts per status for one queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
}

/// Durable, at-least-once job queue
///
/// Implementations must be thread-safe. Leasing respects each queue's
/// concurrency cap; expired leases become leasable again, so consumers
/// must tolerate duplicate delivery.
#[async_trait]
pub trait JobQueue: Send + Sync + 'static {
    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Prepare the client for use
    async fn open(&self) -> Result<(), QueueError>;

    /// Release resources; further operations fail with [`QueueError::Closed`]
    async fn close(&self) -> Result<(), QueueError>;

    /// Set concurrency cap and lease timeout for a queue
    fn declare_queue(&self, queue: &str, options: QueueOptions);

    // =========================================================================
    // Job Operations
    // =========================================================================

    /// Enqueue a job, returns its id
    async fn enqueue(&self, queue: &str, job: NewJob) -> Result<Uuid, QueueError>;

    /// Lease the oldest available job, if the queue is below its cap
    async fn lease(&self, queue: &str) -> Result<Option<LeasedJob>, QueueError>;

    /// Mark a leased job completed
    async fn ack(&self, token: &LeaseToken, result: serde_json::Value)
        -> Result<(), QueueError>;

    /// Fail a leased job; requeues with backoff or fails terminally
    async fn nack(
        &self,
        token: &LeaseToken,
        error: &str,
        disposition: FailureDisposition,
    ) -> Result<NackOutcome, QueueError>;

    /// Return expired leases to waiting (or failed on their final attempt)
    async fn reclaim_expired(&self) -> Result<Vec<Uuid>, QueueError>;

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Get a job by id
    async fn get_job(&self, job_id: Uuid) -> Result<JobInfo, QueueError>;

    /// Count jobs per status
    async fn stats(&self, queue: &str) -> Result<QueueStats, QueueError>;

    /// Most recently failed jobs, newest first
    async fn list_failed(&self, queue: &str, limit: usize) -> Result<Vec<JobInfo>, QueueError>;
}

/// Attempt limit for a failed attempt under the given disposition
pub(crate) fn attempt_limit(policy: &RetryPolicy, disposition: FailureDisposition) -> u32 {
    match disposition {
        FailureDisposition::Retry => policy.max_attempts,
        FailureDisposition::RetryUpTo(limit) => limit,
        FailureDisposition::Terminal => 0,
    }
}

/// When a job delayed by `delay` becomes available again; saturates far in the future
pub(crate) fn available_after(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delay| now.checked_add_signed(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
