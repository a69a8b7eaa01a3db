//! PostgreSQL implementation of JobQueue
//!
//! - Leasing with SKIP LOCKED, serialized per queue by an advisory lock so
//!   the concurrency cap holds across processes
//! - Backoff via `available_at`
//! - Lease tokens checked on every ack/nack

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, error, instrument};
use uuid::Uuid;

use super::store::*;
use crate::reliability::RetryPolicy;

/// PostgreSQL implementation of JobQueue
///
/// Expects the `job_queue` table from the workspace migrations.
///
/// # Example
///
/// ```ignore
/// use placecrawl_durable::PostgresJobQueue;
/// use sqlx::PgPool;
///
/// let pool = PgPool::connect("postgres://localhost/placecrawl").await?;
/// let queue = PostgresJobQueue::new(pool);
/// queue.open().await?;
/// ```
pub struct PostgresJobQueue {
    pool: PgPool,
    queues: RwLock<HashMap<String, QueueOptions>>,
    closed: AtomicBool,
}

impl PostgresJobQueue {
    /// Create a new queue client over the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            queues: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
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

fn db_err(context: &str) -> impl Fn(sqlx::Error) -> QueueError + '_ {
    move |e| {
        error!("Failed to {}: {}", context, e);
        QueueError::Database(e.to_string())
    }
}

fn row_to_info(row: &PgRow) -> Result<JobInfo, QueueError> {
    let status: String = row.get("status");
    let policy: serde_json::Value = row.get("policy");
    let history: serde_json::Value = row.get("error_history");

    Ok(JobInfo {
        id: row.get("id"),
        queue: row.get("queue"),
        job_type: row.get("job_type"),
        data: row.get("data"),
        policy: serde_json::from_value(policy)
            .map_err(|e| QueueError::Serialization(e.to_string()))?,
        status: status.parse()?,
        attempt: row.get::<i32, _>("attempt") as u32,
        last_error: row.get("last_error"),
        error_history: serde_json::from_value(history)
            .map_err(|e| QueueError::Serialization(e.to_string()))?,
        result: row.get("result"),
        available_at: row.get("available_at"),
        leased_until: row.get("leased_until"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

const JOB_COLUMNS: &str = "id, queue, job_type, data, policy, status, attempt, last_error, \
     error_history, result, available_at, leased_until, created_at, updated_at";

#[async_trait]
impl JobQueue for PostgresJobQueue {
    async fn open(&self) -> Result<(), QueueError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_err("open queue connection"))?;
        self.closed.store(false, Ordering::Release);
        Ok(())
    }

    /// Marks the client closed; the pool itself belongs to the caller
    async fn close(&self) -> Result<(), QueueError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn declare_queue(&self, queue: &str, options: QueueOptions) {
        self.queues.write().insert(queue.to_string(), options);
    }

    #[instrument(skip(self, job), fields(job_type = %job.job_type))]
    async fn enqueue(&self, queue: &str, job: NewJob) -> Result<Uuid, QueueError> {
        self.ensure_open()?;

        let job_id = Uuid::now_v7();
        let policy = serde_json::to_value(&job.policy)
            .map_err(|e| QueueError::Serialization(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO job_queue (id, queue, job_type, data, policy, max_attempts)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(job_id)
        .bind(queue)
        .bind(&job.job_type)
        .bind(&job.data)
        .bind(&policy)
        .bind(job.policy.max_attempts as i32)
        .execute(&self.pool)
        .await
        .map_err(db_err("enqueue job"))?;

        debug!(%job_id, queue, "enqueued job");
        Ok(job_id)
    }

    #[instrument(skip(self))]
    async fn lease(&self, queue: &str) -> Result<Option<LeasedJob>, QueueError> {
        self.ensure_open()?;

        let options = self.options(queue);
        let mut tx = self.pool.begin().await.map_err(db_err("begin lease"))?;

        // Serialize leasing per queue so the active count below stays accurate
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(queue)
            .execute(&mut *tx)
            .await
            .map_err(db_err("lock queue"))?;

        sqlx::query(
            r#"
            UPDATE job_queue
            SET status = CASE WHEN attempt < max_attempts THEN 'waiting' ELSE 'failed' END,
                available_at = NOW(),
                lease_id = NULL,
                leased_until = NULL,
                last_error = 'lease expired on attempt ' || attempt,
                error_history = error_history || jsonb_build_array('lease expired on attempt ' || attempt),
                updated_at = NOW()
            WHERE queue = $1 AND status = 'active' AND leased_until <= NOW()
            "#,
        )
        .bind(queue)
        .execute(&mut *tx)
        .await
        .map_err(db_err("reclaim expired leases"))?;

        let active: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM job_queue WHERE queue = $1 AND status = 'active'",
        )
        .bind(queue)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err("count active jobs"))?;

        if active as usize >= options.concurrency {
            tx.commit().await.map_err(db_err("commit lease"))?;
            return Ok(None);
        }

        let lease_id = Uuid::now_v7();
        let lease_ms = options.lease_timeout.as_millis() as i64;

        let row = sqlx::query(
            r#"
            WITH next AS (
                SELECT id
                FROM job_queue
                WHERE queue = $1
                  AND status = 'waiting'
                  AND available_at <= NOW()
                ORDER BY available_at, seq
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE job_queue j
            SET status = 'active',
                attempt = j.attempt + 1,
                lease_id = $2,
                leased_until = NOW() + make_interval(secs => $3::double precision / 1000),
                updated_at = NOW()
            FROM next
            WHERE j.id = next.id
            RETURNING j.id, j.queue, j.job_type, j.data, j.attempt, j.max_attempts, j.leased_until
            "#,
        )
        .bind(queue)
        .bind(lease_id)
        .bind(lease_ms)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err("lease job"))?;

        tx.commit().await.map_err(db_err("commit lease"))?;

        Ok(row.map(|row| {
            let job_id: Uuid = row.get("id");
            debug!(%job_id, queue, "leased job");
            LeasedJob {
                token: LeaseToken { job_id, lease_id },
                queue: row.get("queue"),
                job_type: row.get("job_type"),
                data: row.get("data"),
                attempt: row.get::<i32, _>("attempt") as u32,
                max_attempts: row.get::<i32, _>("max_attempts") as u32,
                leased_until: row.get("leased_until"),
            }
        }))
    }

    #[instrument(skip(self, result), fields(job_id = %token.job_id))]
    async fn ack(
        &self,
        token: &LeaseToken,
        result: serde_json::Value,
    ) -> Result<(), QueueError> {
        self.ensure_open()?;

        let updated = sqlx::query(
            r#"
            UPDATE job_queue
            SET status = 'completed',
                result = $3,
                lease_id = NULL,
                leased_until = NULL,
                updated_at = NOW()
            WHERE id = $1 AND lease_id = $2 AND status = 'active'
            "#,
        )
        .bind(token.job_id)
        .bind(token.lease_id)
        .bind(&result)
        .execute(&self.pool)
        .await
        .map_err(db_err("ack job"))?;

        if updated.rows_affected() == 0 {
            return Err(self.missing_or_lost(token.job_id).await);
        }

        debug!(job_id = %token.job_id, "completed job");
        Ok(())
    }

    #[instrument(skip(self, error), fields(job_id = %token.job_id))]
    async fn nack(
        &self,
        token: &LeaseToken,
        error: &str,
        disposition: FailureDisposition,
    ) -> Result<NackOutcome, QueueError> {
        self.ensure_open()?;

        let mut tx = self.pool.begin().await.map_err(db_err("begin nack"))?;

        let row = sqlx::query(
            r#"
            SELECT attempt, policy
            FROM job_queue
            WHERE id = $1 AND lease_id = $2 AND status = 'active'
            FOR UPDATE
            "#,
        )
        .bind(token.job_id)
        .bind(token.lease_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err("load job for nack"))?;

        let Some(row) = row else {
            drop(tx);
            return Err(self.missing_or_lost(token.job_id).await);
        };

        let attempt = row.get::<i32, _>("attempt") as u32;
        let policy: RetryPolicy = serde_json::from_value(row.get("policy"))
            .map_err(|e| QueueError::Serialization(e.to_string()))?;

        let outcome = if attempt < attempt_limit(&policy, disposition) {
            let next_attempt = attempt + 1;
            let delay = policy.delay_for_attempt(next_attempt);
            let available_at = available_after(Utc::now(), delay);

            sqlx::query(
                r#"
                UPDATE job_queue
                SET status = 'waiting',
                    available_at = $2,
                    lease_id = NULL,
                    leased_until = NULL,
                    last_error = $3,
                    error_history = error_history || jsonb_build_array($3::text),
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(token.job_id)
            .bind(available_at)
            .bind(error)
            .execute(&mut *tx)
            .await
            .map_err(db_err("requeue job"))?;

            NackOutcome::WillRetry {
                next_attempt,
                delay,
            }
        } else {
            sqlx::query(
                r#"
                UPDATE job_queue
                SET status = 'failed',
                    lease_id = NULL,
                    leased_until = NULL,
                    last_error = $2,
                    error_history = error_history || jsonb_build_array($2::text),
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(token.job_id)
            .bind(error)
            .execute(&mut *tx)
            .await
            .map_err(db_err("fail job"))?;

            NackOutcome::Failed { attempts: attempt }
        };

        tx.commit().await.map_err(db_err("commit nack"))?;

        debug!(job_id = %token.job_id, ?outcome, "nacked job");
        Ok(outcome)
    }

    #[instrument(skip(self))]
    async fn reclaim_expired(&self) -> Result<Vec<Uuid>, QueueError> {
        self.ensure_open()?;

        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE job_queue
            SET status = CASE WHEN attempt < max_attempts THEN 'waiting' ELSE 'failed' END,
                available_at = NOW(),
                lease_id = NULL,
                leased_until = NULL,
                last_error = 'lease expired on attempt ' || attempt,
                error_history = error_history || jsonb_build_array('lease expired on attempt ' || attempt),
                updated_at = NOW()
            WHERE status = 'active' AND leased_until <= NOW()
            RETURNING id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("reclaim expired leases"))?;

        if !ids.is_empty() {
            debug!(count = ids.len(), "reclaimed expired leases");
        }
        Ok(ids)
    }

    #[instrument(skip(self))]
    async fn get_job(&self, job_id: Uuid) -> Result<JobInfo, QueueError> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM job_queue WHERE id = $1"))
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("get job"))?
            .ok_or(QueueError::JobNotFound(job_id))?;

        row_to_info(&row)
    }

    #[instrument(skip(self))]
    async fn stats(&self, queue: &str) -> Result<QueueStats, QueueError> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) AS count
            FROM job_queue
            WHERE queue = $1
            GROUP BY status
            "#,
        )
        .bind(queue)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("get queue stats"))?;

        let mut stats = QueueStats::default();
        for row in rows {
            let status: String = row.get("status");
            let count = row.get::<i64, _>("count") as u64;
            match status.parse::<JobStatus>()? {
                JobStatus::Waiting => stats.waiting = count,
                JobStatus::Active => stats.active = count,
                JobStatus::Completed => stats.completed = count,
                JobStatus::Failed => stats.failed = count,
            }
        }
        Ok(stats)
    }

    #[instrument(skip(self))]
    async fn list_failed(&self, queue: &str, limit: usize) -> Result<Vec<JobInfo>, QueueError> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM job_queue \
             WHERE queue = $1 AND status = 'failed' \
             ORDER BY updated_at DESC LIMIT $2"
        ))
        .bind(queue)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("list failed jobs"))?;

        rows.iter().map(row_to_info).collect()
    }
}

impl PostgresJobQueue {
    async fn missing_or_lost(&self, job_id: Uuid) -> QueueError {
        match sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM job_queue WHERE id = $1")
            .bind(job_id)
            .fetch_one(&self.pool)
            .await
        {
            Ok(0) => QueueError::JobNotFound(job_id),
            Ok(_) => QueueError::LeaseLost(job_id),
            Err(e) => QueueError::Database(e.to_string()),
        }
    }
}
