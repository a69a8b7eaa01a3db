//! Worker pool for job execution
//!
//! This module provides:
//! - [`WorkerPool`] - Consumes one queue with bounded concurrency
//! - [`PollerConfig`] - Job polling with exponential backoff
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       WorkerPool                             │
//! │  ┌─────────────┐            ┌─────────────────────────────┐  │
//! │  │  JobPoller  │            │  Expired Lease Reclaimer    │  │
//! │  │  (polling)  │            │          (30s)              │  │
//! │  └──────┬──────┘            └─────────────────────────────┘  │
//! │         │                                                    │
//! │         ▼                                                    │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │         Job Executor (Semaphore-limited)            │    │
//! │  │  [Job 1] [Job 2] [Job 3] ... [Job N]                │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every leased job is settled exactly once by the pool: ack on `Ok`,
//! nack with the handler's disposition on `Err`, terminal nack on panic.

mod poller;
mod pool;

pub use poller::{JobPoller, PollerConfig};
pub use pool::{
    JobFailure, JobHandler, JobResult, WorkerPool, WorkerPoolConfig, WorkerPoolError,
    WorkerPoolStatus,
};
