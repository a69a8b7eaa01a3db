//! In-memory implementation of JobQueue for dev mode and testing

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::store::*;

/// Internal job state
struct JobState {
    seq: u64,
    queue: String,
    job: NewJob,
    status: JobStatus,
    attempt: u32,
    lease_id: Option<Uuid>,
    leased_until: Option<DateTime<Utc>>,
    available_at: DateTime<Utc>,
    last_error: Option<String>,
    error_history: Vec<String>,
    result: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl JobState {
    fn info(&self, id: Uuid) -> JobInfo {
        JobInfo {
            id,
            queue: self.queue.clone(),
            job_type: self.job.job_type.clone(),
            data: self.job.data.clone(),
            policy: self.job.policy.clone(),
            status: self.status,
            attempt: self.attempt,
            last_error: self.last_error.clone(),
            error_history: self.error_history.clone(),
            result: self.result.clone(),
            available_at: self.available_at,
            leased_until: self.leased_until,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    fn holds(&self, token: &LeaseToken) -> bool {
        self.status == JobStatus::Active && self.lease_id == Some(token.lease_id)
    }

    fn release_lease(&mut self) {
        self.lease_id = None;
        self.leased_until = None;
    }
}

/// In-memory implementation of JobQueue
///
/// Provides the same semantics as the PostgreSQL implementation, with all
/// state lost on restart. Used by the control plane in dev mode and by tests.
///
/// # Example
///
/// ```
/// use placecrawl_durable::InMemoryJobQueue;
///
/// let queue = InMemoryJobQueue::new();
/// ```
pub struct InMemoryJobQueue {
    jobs: RwLock<HashMap<Uuid, JobState>>,
    queues: RwLock<HashMap<String, QueueOptions>>,
    sequence: AtomicU64,
    closed: AtomicBool,
}

impl InMemoryJobQueue {
    /// Create a new in-memory queue
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            queues: RwLock::new(HashMap::new()),
            sequence: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Get the number of jobs across all queues
    pub fn job_count(&self) -> usize {
        self.jobs.read().len()
    }

    /// Clear all jobs (for testing)
    pub fn clear(&self) {
        self.jobs.write().clear();
    }

    fn options(&self, queue: &str) -> QueueOptions {
        self.queues.read().get(queue).cloned().unwrap_or_default()
    }

    fn ensure_open(&self) -> Result<(), QueueError> {
        if self.closed.load(Ordering::Acquire) {
            Err(QueueError::Closed)
        } else {
            Ok(())
        }
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Expire leases past their deadline, optionally restricted to one queue
fn expire_leases(
    jobs: &mut HashMap<Uuid, JobState>,
    queue: Option<&str>,
    now: DateTime<Utc>,
) -> Vec<Uuid> {
    let mut reclaimed = vec![];

    for (id, job) in jobs.iter_mut() {
        if job.status != JobStatus::Active {
            continue;
        }
        if queue.is_some_and(|q| q != job.queue) {
            continue;
        }
        if job.leased_until.is_some_and(|until| until <= now) {
            let error = format!("lease expired on attempt {}", job.attempt);
            job.error_history.push(error.clone());
            job.last_error = Some(error);
            job.release_lease();
            job.updated_at = now;
            job.status = if job.job.policy.has_attempts_remaining(job.attempt) {
                job.available_at = now;
                JobStatus::Waiting
            } else {
                JobStatus::Failed
            };
            reclaimed.push(*id);
        }
    }

    reclaimed
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn open(&self) -> Result<(), QueueError> {
        self.closed.store(false, Ordering::Release);
        Ok(())
    }

    async fn close(&self) -> Result<(), QueueError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn declare_queue(&self, queue: &str, options: QueueOptions) {
        self.queues.write().insert(queue.to_string(), options);
    }

    async fn enqueue(&self, queue: &str, job: NewJob) -> Result<Uuid, QueueError> {
        self.ensure_open()?;

        let job_id = Uuid::now_v7();
        let now = Utc::now();
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);

        self.jobs.write().insert(
            job_id,
            JobState {
                seq,
                queue: queue.to_string(),
                job,
                status: JobStatus::Waiting,
                attempt: 0,
                lease_id: None,
                leased_until: None,
                available_at: now,
                last_error: None,
                error_history: vec![],
                result: None,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(job_id)
    }

    async fn lease(&self, queue: &str) -> Result<Option<LeasedJob>, QueueError> {
        self.ensure_open()?;

        let options = self.options(queue);
        let now = Utc::now();
        let mut jobs = self.jobs.write();

        let reclaimed = expire_leases(&mut jobs, Some(queue), now);
        if !reclaimed.is_empty() {
            debug!(queue, count = reclaimed.len(), "reclaimed expired leases");
        }

        let active = jobs
            .values()
            .filter(|j| j.queue == queue && j.status == JobStatus::Active)
            .count();
        if active >= options.concurrency {
            return Ok(None);
        }

        let next = jobs
            .iter()
            .filter(|(_, j)| {
                j.queue == queue && j.status == JobStatus::Waiting && j.available_at <= now
            })
            .min_by_key(|(_, j)| (j.available_at, j.seq))
            .map(|(id, _)| *id);

        let Some(job_id) = next else {
            return Ok(None);
        };
        let Some(job) = jobs.get_mut(&job_id) else {
            return Ok(None);
        };

        let lease_id = Uuid::now_v7();
        let leased_until =
            now + chrono::Duration::from_std(options.lease_timeout).unwrap_or_default();

        job.status = JobStatus::Active;
        job.attempt += 1;
        job.lease_id = Some(lease_id);
        job.leased_until = Some(leased_until);
        job.updated_at = now;

        Ok(Some(LeasedJob {
            token: LeaseToken { job_id, lease_id },
            queue: job.queue.clone(),
            job_type: job.job.job_type.clone(),
            data: job.job.data.clone(),
            attempt: job.attempt,
            max_attempts: job.job.policy.max_attempts,
            leased_until,
        }))
    }

    async fn ack(
        &self,
        token: &LeaseToken,
        result: serde_json::Value,
    ) -> Result<(), QueueError> {
        self.ensure_open()?;

        let mut jobs = self.jobs.write();
        let job = jobs
            .get_mut(&token.job_id)
            .ok_or(QueueError::JobNotFound(token.job_id))?;

        if !job.holds(token) {
            return Err(QueueError::LeaseLost(token.job_id));
        }

        job.status = JobStatus::Completed;
        job.result = Some(result);
        job.release_lease();
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn nack(
        &self,
        token: &LeaseToken,
        error: &str,
        disposition: FailureDisposition,
    ) -> Result<NackOutcome, QueueError> {
        self.ensure_open()?;

        let now = Utc::now();
        let mut jobs = self.jobs.write();
        let job = jobs
            .get_mut(&token.job_id)
            .ok_or(QueueError::JobNotFound(token.job_id))?;

        if !job.holds(token) {
            return Err(QueueError::LeaseLost(token.job_id));
        }

        job.error_history.push(error.to_string());
        job.last_error = Some(error.to_string());
        job.release_lease();
        job.updated_at = now;

        let limit = attempt_limit(&job.job.policy, disposition);
        if job.attempt < limit {
            let next_attempt = job.attempt + 1;
            let delay = job.job.policy.delay_for_attempt(next_attempt);
            job.status = JobStatus::Waiting;
            job.available_at = available_after(now, delay);

            Ok(NackOutcome::WillRetry {
                next_attempt,
                delay,
            })
        } else {
            job.status = JobStatus::Failed;
            Ok(NackOutcome::Failed {
                attempts: job.attempt,
            })
        }
    }

    async fn reclaim_expired(&self) -> Result<Vec<Uuid>, QueueError> {
        self.ensure_open()?;
        let mut jobs = self.jobs.write();
        Ok(expire_leases(&mut jobs, None, Utc::now()))
    }

    async fn get_job(&self, job_id: Uuid) -> Result<JobInfo, QueueError> {
        let jobs = self.jobs.read();
        jobs.get(&job_id)
            .map(|j| j.info(job_id))
            .ok_or(QueueError::JobNotFound(job_id))
    }

    async fn stats(&self, queue: &str) -> Result<QueueStats, QueueError> {
        let jobs = self.jobs.read();
        let mut stats = QueueStats::default();
        for job in jobs.values().filter(|j| j.queue == queue) {
            match job.status {
                JobStatus::Waiting => stats.waiting += 1,
                JobStatus::Active => stats.active += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }

    async fn list_failed(&self, queue: &str, limit: usize) -> Result<Vec<JobInfo>, QueueError> {
        let jobs = self.jobs.read();
        let mut failed: Vec<_> = jobs
            .iter()
            .filter(|(_, j)| j.queue == queue && j.status == JobStatus::Failed)
            .map(|(id, j)| j.info(*id))
            .collect();

        failed.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        failed.truncate(limit);
        Ok(failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reliability::RetryPolicy;
    use std::time::Duration;

    fn job(n: u32, policy: RetryPolicy) -> NewJob {
        NewJob::new("test_job", serde_json::json!({ "n": n }), policy)
    }

    #[tokio::test]
    async fn test_job_lifecycle() {
        let queue = InMemoryJobQueue::new();
        let job_id = queue
            .enqueue("q", job(1, RetryPolicy::no_retry()))
            .await
            .unwrap();

        let leased = queue.lease("q").await.unwrap().unwrap();
        assert_eq!(leased.id(), job_id);
        assert_eq!(leased.attempt, 1);
        assert_eq!(queue.stats("q").await.unwrap().active, 1);

        queue
            .ack(&leased.token, serde_json::json!({"ok": true}))
            .await
            .unwrap();

        let info = queue.get_job(job_id).await.unwrap();
        assert_eq!(info.status, JobStatus::Completed);
        assert_eq!(info.result, Some(serde_json::json!({"ok": true})));
        assert!(queue.lease("q").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fifo_within_queue() {
        let queue = InMemoryJobQueue::new();
        queue.declare_queue("q", QueueOptions::new(10));

        let mut ids = vec![];
        for n in 0..5 {
            ids.push(queue.enqueue("q", job(n, RetryPolicy::no_retry())).await.unwrap());
        }

        for expected in ids {
            let leased = queue.lease("q").await.unwrap().unwrap();
            assert_eq!(leased.id(), expected);
        }
    }

    #[tokio::test]
    async fn test_concurrency_cap() {
        let queue = InMemoryJobQueue::new();
        queue.declare_queue("q", QueueOptions::new(2));
        for n in 0..5 {
            queue.enqueue("q", job(n, RetryPolicy::no_retry())).await.unwrap();
        }

        let first = queue.lease("q").await.unwrap().unwrap();
        let _second = queue.lease("q").await.unwrap().unwrap();
        assert!(queue.lease("q").await.unwrap().is_none());

        queue.ack(&first.token, serde_json::Value::Null).await.unwrap();
        assert!(queue.lease("q").await.unwrap().is_some());
        assert_eq!(queue.stats("q").await.unwrap().active, 2);
    }

    #[tokio::test]
    async fn test_queues_are_independent() {
        let queue = InMemoryJobQueue::new();
        queue.enqueue("a", job(1, RetryPolicy::no_retry())).await.unwrap();

        assert!(queue.lease("b").await.unwrap().is_none());
        assert!(queue.lease("a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_nack_retries_with_increasing_backoff() {
        let queue = InMemoryJobQueue::new();
        let policy = RetryPolicy::exponential(3, Duration::from_millis(10));
        let job_id = queue.enqueue("q", job(1, policy)).await.unwrap();

        let mut delays = vec![];
        loop {
            let leased = loop {
                if let Some(leased) = queue.lease("q").await.unwrap() {
                    break leased;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            };
            match queue
                .nack(&leased.token, "boom", FailureDisposition::Retry)
                .await
                .unwrap()
            {
                NackOutcome::WillRetry { delay, .. } => delays.push(delay),
                NackOutcome::Failed { attempts } => {
                    assert_eq!(attempts, 3);
                    break;
                }
            }
        }

        assert_eq!(
            delays,
            vec![Duration::from_millis(10), Duration::from_millis(20)]
        );
        let info = queue.get_job(job_id).await.unwrap();
        assert_eq!(info.status, JobStatus::Failed);
        assert_eq!(info.error_history.len(), 3);
        assert_eq!(info.last_error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_backoff_delays_availability() {
        let queue = InMemoryJobQueue::new();
        let policy = RetryPolicy::fixed(Duration::from_secs(60), 2);
        queue.enqueue("q", job(1, policy)).await.unwrap();

        let leased = queue.lease("q").await.unwrap().unwrap();
        queue
            .nack(&leased.token, "later", FailureDisposition::Retry)
            .await
            .unwrap();

        assert!(queue.lease("q").await.unwrap().is_none());
        assert_eq!(queue.stats("q").await.unwrap().waiting, 1);
    }

    #[tokio::test]
    async fn test_terminal_and_bounded_dispositions() {
        let queue = InMemoryJobQueue::new();
        let policy = RetryPolicy::fixed(Duration::ZERO, 5);

        let terminal_id = queue.enqueue("q", job(1, policy.clone())).await.unwrap();
        let leased = queue.lease("q").await.unwrap().unwrap();
        let outcome = queue
            .nack(&leased.token, "absent", FailureDisposition::Terminal)
            .await
            .unwrap();
        assert_eq!(outcome, NackOutcome::Failed { attempts: 1 });
        assert_eq!(
            queue.get_job(terminal_id).await.unwrap().status,
            JobStatus::Failed
        );

        queue.enqueue("q", job(2, policy)).await.unwrap();
        let leased = queue.lease("q").await.unwrap().unwrap();
        let outcome = queue
            .nack(&leased.token, "db down", FailureDisposition::RetryUpTo(2))
            .await
            .unwrap();
        assert!(matches!(outcome, NackOutcome::WillRetry { next_attempt: 2, .. }));

        let leased = queue.lease("q").await.unwrap().unwrap();
        let outcome = queue
            .nack(&leased.token, "db down", FailureDisposition::RetryUpTo(2))
            .await
            .unwrap();
        assert_eq!(outcome, NackOutcome::Failed { attempts: 2 });
    }

    #[tokio::test]
    async fn test_expired_lease_is_reclaimable() {
        let queue = InMemoryJobQueue::new();
        queue.declare_queue(
            "q",
            QueueOptions::new(1).with_lease_timeout(Duration::from_millis(20)),
        );
        let job_id = queue
            .enqueue("q", job(1, RetryPolicy::fixed(Duration::ZERO, 3)))
            .await
            .unwrap();

        let crashed = queue.lease("q").await.unwrap().unwrap();
        assert!(queue.lease("q").await.unwrap().is_none());

        tokio::time::sleep(Duration::from_millis(40)).await;

        let second = queue.lease("q").await.unwrap().unwrap();
        assert_eq!(second.id(), job_id);
        assert_eq!(second.attempt, 2);

        // The crashed holder can no longer settle the job
        let err = queue
            .ack(&crashed.token, serde_json::Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::LeaseLost(id) if id == job_id));

        queue.ack(&second.token, serde_json::Value::Null).await.unwrap();
    }

    #[tokio::test]
    async fn test_reclaim_expired_on_final_attempt_fails() {
        let queue = InMemoryJobQueue::new();
        queue.declare_queue(
            "q",
            QueueOptions::new(1).with_lease_timeout(Duration::from_millis(10)),
        );
        let job_id = queue
            .enqueue("q", job(1, RetryPolicy::no_retry()))
            .await
            .unwrap();
        queue.lease("q").await.unwrap().unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        let reclaimed = queue.reclaim_expired().await.unwrap();
        assert_eq!(reclaimed, vec![job_id]);
        let info = queue.get_job(job_id).await.unwrap();
        assert_eq!(info.status, JobStatus::Failed);
        assert!(info.last_error.unwrap().contains("lease expired"));
    }

    #[tokio::test]
    async fn test_list_failed() {
        let queue = InMemoryJobQueue::new();
        queue.declare_queue("q", QueueOptions::new(5));
        for n in 0..3 {
            queue.enqueue("q", job(n, RetryPolicy::no_retry())).await.unwrap();
        }
        for _ in 0..3 {
            let leased = queue.lease("q").await.unwrap().unwrap();
            queue
                .nack(&leased.token, "nope", FailureDisposition::Retry)
                .await
                .unwrap();
        }

        assert_eq!(queue.list_failed("q", 10).await.unwrap().len(), 3);
        assert_eq!(queue.list_failed("q", 2).await.unwrap().len(), 2);
        assert_eq!(queue.stats("q").await.unwrap().failed, 3);
    }

    #[tokio::test]
    async fn test_closed_queue_rejects_operations() {
        let queue = InMemoryJobQueue::new();
        queue.close().await.unwrap();

        let err = queue
            .enqueue("q", job(1, RetryPolicy::no_retry()))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Closed));

        queue.open().await.unwrap();
        assert!(queue.enqueue("q", job(1, RetryPolicy::no_retry())).await.is_ok());
    }
}
