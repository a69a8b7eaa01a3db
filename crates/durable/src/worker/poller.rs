//! Job polling with exponential backoff
//!
//! Leases jobs from one queue with adaptive polling intervals.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, instrument, trace};

use crate::persistence::{JobQueue, LeasedJob, QueueError};
use crate::reliability::duration_millis;

/// Polling configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollerConfig {
    /// Minimum poll interval (when jobs are available)
    #[serde(with = "duration_millis")]
    pub min_interval: Duration,

    /// Maximum poll interval (when idle)
    #[serde(with = "duration_millis")]
    pub max_interval: Duration,

    /// Backoff multiplier when no jobs found
    pub backoff_multiplier: f64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(50),
            max_interval: Duration::from_secs(2),
            backoff_multiplier: 1.5,
        }
    }
}

impl PollerConfig {
    /// Create a new poller configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set minimum poll interval
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Set maximum poll interval
    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Set backoff multiplier
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier.max(1.0);
        self
    }
}

/// Job poller with adaptive backoff
///
/// Backs off exponentially while the queue is idle and resets to the
/// minimum interval as soon as a job is leased.
pub struct JobPoller {
    queue: Arc<dyn JobQueue>,
    queue_name: String,
    config: PollerConfig,
    current_interval: Duration,
    shutdown_rx: watch::Receiver<bool>,
}

impl JobPoller {
    /// Create a new job poller
    pub fn new(
        queue: Arc<dyn JobQueue>,
        queue_name: impl Into<String>,
        config: PollerConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            queue,
            queue_name: queue_name.into(),
            current_interval: config.min_interval,
            config,
            shutdown_rx,
        }
    }

    /// Lease up to `max_jobs` jobs
    ///
    /// The queue may hand out fewer when its concurrency cap is reached.
    #[instrument(skip(self), fields(queue = %self.queue_name))]
    pub async fn poll(&mut self, max_jobs: usize) -> Result<Vec<LeasedJob>, QueueError> {
        if *self.shutdown_rx.borrow() {
            debug!("Poller shutdown requested");
            return Ok(vec![]);
        }

        let mut jobs = Vec::new();
        while jobs.len() < max_jobs {
            match self.queue.lease(&self.queue_name).await? {
                Some(job) => jobs.push(job),
                None => break,
            }
        }

        if jobs.is_empty() {
            self.increase_backoff();
            trace!(
                interval_ms = self.current_interval.as_millis(),
                "No jobs found, backing off"
            );
        } else {
            self.reset_backoff();
            debug!(count = jobs.len(), "Leased jobs");
        }

        Ok(jobs)
    }

    /// Wait for the current backoff interval
    ///
    /// Returns `true` if shutdown was signaled while waiting.
    pub async fn wait(&mut self) -> bool {
        let mut shutdown_rx = self.shutdown_rx.clone();
        tokio::select! {
            _ = tokio::time::sleep(self.current_interval) => false,
            _ = shutdown_rx.changed() => {
                debug!("Shutdown signal received during wait");
                true
            }
        }
    }

    /// Get the current poll interval
    pub fn current_interval(&self) -> Duration {
        self.current_interval
    }

    /// Check if shutdown has been requested
    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    fn reset_backoff(&mut self) {
        self.current_interval = self.config.min_interval;
    }

    fn increase_backoff(&mut self) {
        let new_interval = Duration::from_secs_f64(
            self.current_interval.as_secs_f64() * self.config.backoff_multiplier,
        );
        self.current_interval = new_interval.min(self.config.max_interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{InMemoryJobQueue, NewJob, QueueOptions};
    use crate::reliability::RetryPolicy;

    fn poller(queue: Arc<dyn JobQueue>, config: PollerConfig) -> (JobPoller, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        (JobPoller::new(queue, "q", config, rx), tx)
    }

    #[test]
    fn test_config_builder() {
        let config = PollerConfig::new()
            .with_min_interval(Duration::from_millis(10))
            .with_max_interval(Duration::from_secs(1))
            .with_backoff_multiplier(0.5);

        assert_eq!(config.min_interval, Duration::from_millis(10));
        assert_eq!(config.max_interval, Duration::from_secs(1));
        assert_eq!(config.backoff_multiplier, 1.0);
    }

    #[tokio::test]
    async fn test_backoff_grows_when_idle_and_resets() {
        let queue = Arc::new(InMemoryJobQueue::new());
        let config = PollerConfig::new()
            .with_min_interval(Duration::from_millis(100))
            .with_max_interval(Duration::from_millis(300))
            .with_backoff_multiplier(2.0);
        let (mut poller, _tx) = poller(queue.clone(), config);

        assert!(poller.poll(1).await.unwrap().is_empty());
        assert_eq!(poller.current_interval(), Duration::from_millis(200));
        poller.poll(1).await.unwrap();
        assert_eq!(poller.current_interval(), Duration::from_millis(300));

        queue
            .enqueue("q", NewJob::new("t", serde_json::json!({}), RetryPolicy::no_retry()))
            .await
            .unwrap();
        assert_eq!(poller.poll(1).await.unwrap().len(), 1);
        assert_eq!(poller.current_interval(), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_poll_respects_queue_cap() {
        let queue = Arc::new(InMemoryJobQueue::new());
        queue.declare_queue("q", QueueOptions::new(2));
        for _ in 0..4 {
            queue
                .enqueue("q", NewJob::new("t", serde_json::json!({}), RetryPolicy::no_retry()))
                .await
                .unwrap();
        }
        let (mut poller, _tx) = poller(queue, PollerConfig::default());

        assert_eq!(poller.poll(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_wait_returns_on_shutdown() {
        let queue = Arc::new(InMemoryJobQueue::new());
        let config = PollerConfig::new().with_min_interval(Duration::from_secs(60));
        let (mut poller, tx) = poller(queue, config);

        tx.send(true).unwrap();
        assert!(poller.wait().await);
        assert!(poller.is_shutdown());
        assert!(poller.poll(1).await.unwrap().is_empty());
    }
}
