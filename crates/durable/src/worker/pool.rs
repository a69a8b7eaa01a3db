//! Worker pool for job execution
//!
//! Consumes one queue with bounded concurrency and graceful shutdown.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::poller::{JobPoller, PollerConfig};
use crate::persistence::{FailureDisposition, JobQueue, LeasedJob, NackOutcome, QueueError};
use crate::reliability::duration_millis;

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    /// Unique worker ID (generated if not provided)
    pub worker_id: String,

    /// Queue this pool consumes
    pub queue: String,

    /// Maximum concurrent job executions in this process
    pub max_concurrency: usize,

    /// Poller configuration
    pub poller: PollerConfig,

    /// Expired lease reclamation interval
    #[serde(with = "duration_millis")]
    pub reclaim_interval: Duration,

    /// Graceful shutdown timeout
    #[serde(with = "duration_millis")]
    pub shutdown_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", Uuid::now_v7()),
            queue: "default".to_string(),
            max_concurrency: 1,
            poller: PollerConfig::default(),
            reclaim_interval: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerPoolConfig {
    /// Create a configuration for the given queue
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            ..Default::default()
        }
    }

    /// Set the worker ID
    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }

    /// Set maximum concurrency
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    /// Set poller configuration
    pub fn with_poller(mut self, config: PollerConfig) -> Self {
        self.poller = config;
        self
    }

    /// Set reclaim interval
    pub fn with_reclaim_interval(mut self, interval: Duration) -> Self {
        self.reclaim_interval = interval;
        self
    }

    /// Set shutdown timeout
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Worker pool status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPoolStatus {
    /// Worker is running and accepting jobs
    Running,
    /// Worker is draining (completing current jobs, not leasing new ones)
    Draining,
    /// Worker has stopped
    Stopped,
}

/// Worker pool errors
#[derive(Debug, thiserror::Error)]
pub enum WorkerPoolError {
    /// Queue error
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// Worker already running
    #[error("worker pool is already running")]
    AlreadyRunning,

    /// Shutdown timeout
    #[error("graceful shutdown timed out")]
    ShutdownTimeout,
}

/// A failed job attempt, with how the queue should treat it
#[derive(Debug, Clone, PartialEq)]
pub struct JobFailure {
    pub message: String,
    pub disposition: FailureDisposition,
}

impl JobFailure {
    /// Retry under the job's own policy
    pub fn retry(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            disposition: FailureDisposition::Retry,
        }
    }

    /// Retry, capped at `max_attempts` in total
    pub fn retry_up_to(message: impl Into<String>, max_attempts: u32) -> Self {
        Self {
            message: message.into(),
            disposition: FailureDisposition::RetryUpTo(max_attempts),
        }
    }

    /// Fail without retrying
    pub fn terminal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            disposition: FailureDisposition::Terminal,
        }
    }
}

impl std::fmt::Display for JobFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Job execution result
pub type JobResult = Result<serde_json::Value, JobFailure>;

/// Job handler function type
pub type JobHandler =
    Arc<dyn Fn(LeasedJob) -> Pin<Box<dyn Future<Output = JobResult> + Send>> + Send + Sync>;

/// Worker pool for executing jobs from one queue
///
/// # Example
///
/// ```ignore
/// use placecrawl_durable::worker::{JobFailure, WorkerPool, WorkerPoolConfig};
///
/// let config = WorkerPoolConfig::new("visit").with_max_concurrency(5);
/// let pool = WorkerPool::new(queue, config);
///
/// pool.register_handler("visit_place", |job| async move {
///     Ok(json!({"status": "done"}))
/// });
///
/// pool.start().await?;
///
/// // ... later, graceful shutdown
/// pool.shutdown().await?;
/// ```
pub struct WorkerPool {
    queue: Arc<dyn JobQueue>,
    config: WorkerPoolConfig,
    handlers: RwLock<HashMap<String, JobHandler>>,
    shutdown_tx: watch::Sender<bool>,
    status: RwLock<WorkerPoolStatus>,
    active_jobs: Arc<Semaphore>,
    poll_handle: Mutex<Option<JoinHandle<()>>>,
    reclaim_handle: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Create a new worker pool
    pub fn new(queue: Arc<dyn JobQueue>, config: WorkerPoolConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            queue,
            active_jobs: Arc::new(Semaphore::new(config.max_concurrency)),
            config,
            handlers: RwLock::new(HashMap::new()),
            shutdown_tx,
            status: RwLock::new(WorkerPoolStatus::Stopped),
            poll_handle: Mutex::new(None),
            reclaim_handle: Mutex::new(None),
        }
    }

    /// Register a handler for a job type
    pub fn register_handler<F, Fut>(&self, job_type: &str, handler: F)
    where
        F: Fn(LeasedJob) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JobResult> + Send + 'static,
    {
        let handler: JobHandler = Arc::new(move |job| Box::pin(handler(job)));
        self.handlers.write().insert(job_type.to_string(), handler);
    }

    /// Start the worker pool
    #[instrument(skip(self), fields(worker_id = %self.config.worker_id, queue = %self.config.queue))]
    pub async fn start(&self) -> Result<(), WorkerPoolError> {
        if *self.status.read() != WorkerPoolStatus::Stopped {
            return Err(WorkerPoolError::AlreadyRunning);
        }

        info!(
            worker_id = %self.config.worker_id,
            queue = %self.config.queue,
            max_concurrency = self.config.max_concurrency,
            "Starting worker pool"
        );

        self.shutdown_tx.send_replace(false);
        *self.status.write() = WorkerPoolStatus::Running;

        self.start_poll_loop();
        self.start_reclaim_loop();

        Ok(())
    }

    /// Shutdown the worker pool gracefully
    ///
    /// Stops leasing, then waits for in-flight jobs to settle.
    #[instrument(skip(self), fields(worker_id = %self.config.worker_id, queue = %self.config.queue))]
    pub async fn shutdown(&self) -> Result<(), WorkerPoolError> {
        if *self.status.read() == WorkerPoolStatus::Stopped {
            return Ok(());
        }

        info!(queue = %self.config.queue, "Initiating graceful shutdown");

        *self.status.write() = WorkerPoolStatus::Draining;
        self.shutdown_tx.send_replace(true);

        let poll_handle = self.poll_handle.lock().take();
        if let Some(handle) = poll_handle {
            if let Err(e) = handle.await {
                error!("Poll loop panicked: {}", e);
            }
        }
        let reclaim_handle = self.reclaim_handle.lock().take();
        if let Some(handle) = reclaim_handle {
            handle.abort();
        }

        let deadline = tokio::time::Instant::now() + self.config.shutdown_timeout;
        loop {
            let in_flight = self.active_count();
            if in_flight == 0 {
                debug!("All jobs settled");
                break;
            }

            if tokio::time::Instant::now() >= deadline {
                warn!(remaining_jobs = in_flight, "Shutdown timeout reached");
                *self.status.write() = WorkerPoolStatus::Stopped;
                return Err(WorkerPoolError::ShutdownTimeout);
            }

            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        *self.status.write() = WorkerPoolStatus::Stopped;

        info!(queue = %self.config.queue, "Worker pool stopped");
        Ok(())
    }

    /// Get current status
    pub fn status(&self) -> WorkerPoolStatus {
        *self.status.read()
    }

    /// Number of jobs currently executing
    pub fn active_count(&self) -> usize {
        self.config.max_concurrency - self.active_jobs.available_permits()
    }

    /// Get the worker ID
    pub fn worker_id(&self) -> &str {
        &self.config.worker_id
    }

    fn start_poll_loop(&self) {
        let queue = Arc::clone(&self.queue);
        let handlers = self.handlers.read().clone();
        let active_jobs = Arc::clone(&self.active_jobs);
        let mut poller = JobPoller::new(
            Arc::clone(&queue),
            self.config.queue.clone(),
            self.config.poller.clone(),
            self.shutdown_tx.subscribe(),
        );

        let handle = tokio::spawn(async move {
            loop {
                if poller.is_shutdown() {
                    debug!("Poll loop: shutdown requested");
                    break;
                }

                let available_slots = active_jobs.available_permits();
                if available_slots == 0 {
                    if poller.wait().await {
                        break;
                    }
                    continue;
                }

                match poller.poll(available_slots).await {
                    Ok(jobs) => {
                        for job in jobs {
                            // Leased jobs never exceed free permits, so this does not block
                            let permit = match Arc::clone(&active_jobs).acquire_owned().await {
                                Ok(p) => p,
                                Err(_) => break,
                            };

                            let queue = Arc::clone(&queue);
                            let handler = handlers.get(&job.job_type).map(Arc::clone);

                            tokio::spawn(async move {
                                execute_job(queue, handler, job).await;
                                drop(permit);
                            });
                        }
                    }
                    Err(e) => {
                        error!("Poll error: {}", e);
                    }
                }

                if poller.wait().await {
                    break;
                }
            }

            debug!("Poll loop exited");
        });

        *self.poll_handle.lock() = Some(handle);
    }

    fn start_reclaim_loop(&self) {
        let queue = Arc::clone(&self.queue);
        let interval = self.config.reclaim_interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match queue.reclaim_expired().await {
                            Ok(reclaimed) => {
                                if !reclaimed.is_empty() {
                                    info!(count = reclaimed.len(), "Reclaimed expired leases");
                                }
                            }
                            Err(e) => {
                                error!("Lease reclamation failed: {}", e);
                            }
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        debug!("Reclaim loop: shutdown requested");
                        break;
                    }
                }
            }
        });

        *self.reclaim_handle.lock() = Some(handle);
    }
}

/// Run one leased job to completion and settle it
async fn execute_job(queue: Arc<dyn JobQueue>, handler: Option<JobHandler>, job: LeasedJob) {
    let token = job.token;
    let job_type = job.job_type.clone();
    let attempt = job.attempt;

    let result = match handler {
        Some(handler) => {
            // The handler call itself sits inside the caught future
            match AssertUnwindSafe(async move { handler(job).await })
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(panic) => Err(JobFailure::terminal(format!(
                    "handler panicked: {}",
                    panic_message(panic.as_ref())
                ))),
            }
        }
        None => {
            warn!(%job_type, "No handler registered");
            Err(JobFailure::terminal(format!(
                "no handler registered for job type: {job_type}"
            )))
        }
    };

    match result {
        Ok(output) => {
            if let Err(e) = queue.ack(&token, output).await {
                error!(job_id = %token.job_id, "Failed to ack job: {}", e);
            } else {
                debug!(job_id = %token.job_id, %job_type, attempt, "Job completed");
            }
        }
        Err(failure) => {
            match queue
                .nack(&token, &failure.message, failure.disposition)
                .await
            {
                Ok(NackOutcome::WillRetry {
                    next_attempt,
                    delay,
                }) => {
                    warn!(
                        job_id = %token.job_id,
                        %job_type,
                        attempt,
                        next_attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure,
                        "Job failed, will retry"
                    );
                }
                Ok(NackOutcome::Failed { attempts }) => {
                    error!(
                        job_id = %token.job_id,
                        %job_type,
                        attempts,
                        error = %failure,
                        "Job failed permanently"
                    );
                }
                Err(e) => {
                    error!(job_id = %token.job_id, "Failed to nack job: {}", e);
                }
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
