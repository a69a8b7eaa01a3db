//! Reliability patterns for the job queue
//!
//! This module provides:
//! - [`RetryPolicy`] - Named retry policy with fixed or exponential backoff

mod retry;

pub(crate) use retry::duration_millis;
pub use retry::{BackoffKind, RetryPolicy};
