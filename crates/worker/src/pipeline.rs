// Crawl pipeline
// Decision: One queue client, two named queues, one worker pool per queue
// Decision: Submission only records the area and enqueues; it never extracts inline
// Decision: An area whose discovery job cannot be enqueued is removed again
//
// submission -> AreaJob -> discovery pool -> N x VisitJob -> visit pool -> PlaceStore

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{error, info, instrument};
use uuid::Uuid;

use placecrawl_core::{Area, AreaJob, AreaStore, ExtractorFactory, NewArea, PlaceStore};
use placecrawl_durable::{
    JobQueue, NewJob, PollerConfig, QueueError, QueueOptions, RetryPolicy, WorkerPool,
    WorkerPoolConfig, WorkerPoolError,
};

use crate::config::WorkerConfig;
use crate::error::SubmitError;
use crate::handlers::{
    handle_discovery, handle_visit, CrawlContext, DISCOVERY_QUEUE, DISCOVER_AREA, VISIT_PLACE,
    VISIT_QUEUE,
};

/// Result of an accepted submission
#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub area: Area,
    /// Id of the enqueued discovery job
    pub job_id: Uuid,
}

/// Accepts area submissions: validates, records the area, enqueues discovery
#[derive(Clone)]
pub struct AreaSubmitter {
    queue: Arc<dyn JobQueue>,
    areas: Arc<dyn AreaStore>,
    policy: RetryPolicy,
}

impl AreaSubmitter {
    pub fn new(queue: Arc<dyn JobQueue>, areas: Arc<dyn AreaStore>, policy: RetryPolicy) -> Self {
        Self {
            queue,
            areas,
            policy,
        }
    }

    #[instrument(skip(self))]
    pub async fn submit(&self, area: NewArea) -> Result<Submission, SubmitError> {
        area.validate()?;

        let area = self.areas.create_area(area).await?;
        let job_id = match self.enqueue_discovery(&area).await {
            Ok(job_id) => job_id,
            Err(e) => {
                // An area without a discovery job would never be crawled
                if let Err(cleanup) = self.areas.delete_area(area.id).await {
                    error!(area_id = %area.id, error = %cleanup, "Failed to remove unqueued area");
                }
                return Err(e.into());
            }
        };

        info!(area_id = %area.id, job_id = %job_id, "Area submitted");
        Ok(Submission { area, job_id })
    }

    async fn enqueue_discovery(&self, area: &Area) -> Result<Uuid, QueueError> {
        let data = serde_json::to_value(AreaJob::from(area))
            .map_err(|e| QueueError::Serialization(e.to_string()))?;
        self.queue
            .enqueue(
                DISCOVERY_QUEUE,
                NewJob::new(DISCOVER_AREA, data, self.policy.clone()),
            )
            .await
    }
}

/// The discovery and visit stages running on one queue client
pub struct CrawlPipeline {
    ctx: Arc<CrawlContext>,
    submitter: AreaSubmitter,
    worker_id: String,
    discovery_concurrency: usize,
    visit_concurrency: usize,
    lease_timeout: Duration,
    poller: PollerConfig,
    pools: Mutex<Vec<Arc<WorkerPool>>>,
}

impl CrawlPipeline {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        places: Arc<dyn PlaceStore>,
        areas: Arc<dyn AreaStore>,
        extractors: Arc<dyn ExtractorFactory>,
        config: &WorkerConfig,
    ) -> Self {
        let submitter = AreaSubmitter::new(
            Arc::clone(&queue),
            areas,
            config.policies.discovery.clone(),
        );
        let ctx = Arc::new(CrawlContext {
            queue,
            places,
            extractors,
            policies: config.policies.clone(),
        });

        Self {
            ctx,
            submitter,
            worker_id: config.worker_id.clone(),
            discovery_concurrency: config.discovery_concurrency,
            visit_concurrency: config.visit_concurrency,
            lease_timeout: config.lease_timeout,
            poller: PollerConfig::default(),
            pools: Mutex::new(Vec::new()),
        }
    }

    /// Override idle polling for both pools
    pub fn with_poller(mut self, poller: PollerConfig) -> Self {
        self.poller = poller;
        self
    }

    pub fn submitter(&self) -> &AreaSubmitter {
        &self.submitter
    }

    pub async fn submit(&self, area: NewArea) -> Result<Submission, SubmitError> {
        self.submitter.submit(area).await
    }

    /// Declare both queues with their caps and start one pool per queue
    pub async fn start(&self) -> Result<(), WorkerPoolError> {
        let queue = &self.ctx.queue;
        queue.declare_queue(
            DISCOVERY_QUEUE,
            QueueOptions::new(self.discovery_concurrency).with_lease_timeout(self.lease_timeout),
        );
        queue.declare_queue(
            VISIT_QUEUE,
            QueueOptions::new(self.visit_concurrency).with_lease_timeout(self.lease_timeout),
        );

        let discovery = self.pool(DISCOVERY_QUEUE, self.discovery_concurrency);
        let ctx = Arc::clone(&self.ctx);
        discovery.register_handler(DISCOVER_AREA, move |job| {
            let ctx = Arc::clone(&ctx);
            async move { handle_discovery(&ctx, job).await }
        });

        let visit = self.pool(VISIT_QUEUE, self.visit_concurrency);
        let ctx = Arc::clone(&self.ctx);
        visit.register_handler(VISIT_PLACE, move |job| {
            let ctx = Arc::clone(&ctx);
            async move { handle_visit(&ctx, job).await }
        });

        discovery.start().await?;
        if let Err(e) = visit.start().await {
            let _ = discovery.shutdown().await;
            return Err(e);
        }

        self.pools.lock().extend([discovery, visit]);
        info!(
            worker_id = %self.worker_id,
            discovery_concurrency = self.discovery_concurrency,
            visit_concurrency = self.visit_concurrency,
            "Crawl pipeline started"
        );
        Ok(())
    }

    /// Stop leasing and drain in-flight jobs of both stages
    pub async fn shutdown(&self) -> Result<(), WorkerPoolError> {
        let pools = std::mem::take(&mut *self.pools.lock());
        let mut result = Ok(());
        for pool in pools {
            if let Err(e) = pool.shutdown().await {
                error!(error = %e, "Worker pool did not shut down cleanly");
                result = Err(e);
            }
        }
        info!(worker_id = %self.worker_id, "Crawl pipeline stopped");
        result
    }

    fn pool(&self, queue: &str, concurrency: usize) -> Arc<WorkerPool> {
        let config = WorkerPoolConfig::new(queue)
            .with_worker_id(format!("{}-{}", self.worker_id, queue))
            .with_max_concurrency(concurrency)
            .with_poller(self.poller.clone());
        Arc::new(WorkerPool::new(Arc::clone(&self.ctx.queue), config))
    }
}
