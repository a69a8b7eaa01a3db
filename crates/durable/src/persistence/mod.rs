//! Persistence layer for the job queue
//!
//! This module provides:
//! - [`JobQueue`] trait for leasing, settling and inspecting jobs
//! - [`InMemoryJobQueue`] for dev mode and testing
//! - [`PostgresJobQueue`] for production

mod memory;
mod postgres;
mod store;

pub use memory::InMemoryJobQueue;
pub use postgres::PostgresJobQueue;
pub use store::{
    FailureDisposition, JobInfo, JobQueue, JobStatus, LeaseToken, LeasedJob, NackOutcome, NewJob,
    QueueError, QueueOptions, QueueStats,
};
