//! # Durable Job Queue
//!
//! A PostgreSQL-backed job queue with lease-based, at-least-once delivery.
//!
//! ## Features
//!
//! - **Named queues**: Each queue has its own concurrency cap and lease timeout
//! - **Automatic retries**: Per-job retry policies with fixed or exponential backoff
//! - **Crash recovery**: Expired leases become leasable again
//! - **Worker pools**: Bounded concurrent execution with graceful shutdown
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       JobQueue                               │
//! │  (PostgreSQL job_queue table, or in memory for dev mode)    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      WorkerPool                              │
//! │  (leases jobs, runs handlers, acks/nacks, reclaims leases)  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use placecrawl_durable::prelude::*;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let queue = InMemoryJobQueue::new();
//! queue.declare_queue("visit", QueueOptions::new(5));
//!
//! let policy = RetryPolicy::exponential(3, Duration::from_secs(1));
//! let job_id = queue
//!     .enqueue("visit", NewJob::new("visit_place", serde_json::json!({}), policy))
//!     .await
//!     .unwrap();
//!
//! let leased = queue.lease("visit").await.unwrap().unwrap();
//! assert_eq!(leased.id(), job_id);
//! queue.ack(&leased.token, serde_json::json!({"ok": true})).await.unwrap();
//! # });
//! ```

pub mod persistence;
pub mod reliability;
pub mod worker;

/// Prelude for common imports
pub mod prelude {
    pub use crate::persistence::{
        FailureDisposition, InMemoryJobQueue, JobInfo, JobQueue, JobStatus, LeaseToken,
        LeasedJob, NackOutcome, NewJob, PostgresJobQueue, QueueError, QueueOptions, QueueStats,
    };
    pub use crate::reliability::{BackoffKind, RetryPolicy};
    pub use crate::worker::{JobFailure, WorkerPool, WorkerPoolConfig, WorkerPoolError};
}

// Re-export key types at crate root
pub use persistence::{
    FailureDisposition, InMemoryJobQueue, JobInfo, JobQueue, JobStatus, LeaseToken, LeasedJob,
    NackOutcome, NewJob, PostgresJobQueue, QueueError, QueueOptions, QueueStats,
};
pub use reliability::{BackoffKind, RetryPolicy};
pub use worker::{
    JobFailure, JobResult, PollerConfig, WorkerPool, WorkerPoolConfig, WorkerPoolError,
    WorkerPoolStatus,
};
