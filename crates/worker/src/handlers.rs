// Discovery and visit job handlers
//
// Discovery: list candidates in an area, dedupe by place_id within the call,
// enqueue one visit per unique candidate.
// Visit: fetch a candidate's details and merge them into the place store.
//
// Both open a fresh extractor session per job and close it whatever happens,
// including a panic inside the extractor, which is re-raised after the close.

use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures::FutureExt;
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};

use placecrawl_core::{
    parse_coordinates, AreaJob, Candidate, ExtractorFactory, Place, PlaceStore, PlaceUpsert,
    VisitJob,
};
use placecrawl_durable::{FailureDisposition, JobQueue, JobResult, LeasedJob, NewJob, QueueError};

use crate::config::CrawlPolicies;
use crate::error::CrawlError;

/// Queue consumed by discovery workers
pub const DISCOVERY_QUEUE: &str = "discovery";
/// Queue consumed by visit workers
pub const VISIT_QUEUE: &str = "visit";

/// Job type of an AreaJob
pub const DISCOVER_AREA: &str = "discover_area";
/// Job type of a VisitJob
pub const VISIT_PLACE: &str = "visit_place";

/// Everything a handler needs, shared by all jobs of a pipeline
pub struct CrawlContext {
    pub queue: Arc<dyn JobQueue>,
    pub places: Arc<dyn PlaceStore>,
    pub extractors: Arc<dyn ExtractorFactory>,
    pub policies: CrawlPolicies,
}

/// Keep the first candidate for each place_id, in listing order
pub fn dedupe_candidates(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.place_id.clone()))
        .collect()
}

/// List an area and enqueue a visit per unique candidate
///
/// Returns the number of visits enqueued.
#[instrument(skip(ctx, area), fields(area_id = %area.area_id))]
pub async fn discover_area(ctx: &CrawlContext, area: &AreaJob) -> Result<usize, CrawlError> {
    let mut extractor = ctx.extractors.open().await?;
    let listed = AssertUnwindSafe(extractor.list(area)).catch_unwind().await;
    extractor.close().await;

    let listed = listed.unwrap_or_else(|payload| panic::resume_unwind(payload))?;
    let total = listed.len();
    let candidates = dedupe_candidates(listed);
    if candidates.len() < total {
        debug!(
            listed = total,
            unique = candidates.len(),
            "Dropped duplicate candidates"
        );
    }

    for candidate in &candidates {
        let visit = VisitJob::from(candidate.clone());
        let data =
            serde_json::to_value(&visit).map_err(|e| QueueError::Serialization(e.to_string()))?;
        ctx.queue
            .enqueue(
                VISIT_QUEUE,
                NewJob::new(VISIT_PLACE, data, ctx.policies.visit.clone()),
            )
            .await?;
    }

    Ok(candidates.len())
}

/// Fetch one candidate's details and merge them into the store
#[instrument(skip(ctx, visit), fields(place_id = %visit.place_id))]
pub async fn visit_place(ctx: &CrawlContext, visit: &VisitJob) -> Result<Place, CrawlError> {
    let coordinates = parse_coordinates(&visit.source_ref);
    if coordinates.is_none() {
        debug!(source_ref = %visit.source_ref, "No coordinates in source reference");
    }

    let mut extractor = ctx.extractors.open().await?;
    let details = AssertUnwindSafe(extractor.detail(&visit.source_ref))
        .catch_unwind()
        .await;
    extractor.close().await;

    let details = details.unwrap_or_else(|payload| panic::resume_unwind(payload))?;
    let upsert = PlaceUpsert::from_visit(visit, coordinates, details);
    Ok(ctx.places.upsert(upsert).await?)
}

/// Queue entry point for discovery jobs
pub async fn handle_discovery(ctx: &CrawlContext, job: LeasedJob) -> JobResult {
    let persistence_max = ctx.policies.persistence_max_attempts;
    let area: AreaJob = serde_json::from_value(job.data.clone())
        .map_err(|e| CrawlError::from(e).into_failure(persistence_max))?;

    match discover_area(ctx, &area).await {
        Ok(count) => {
            info!(
                job_id = %job.id(),
                area_id = %area.area_id,
                count,
                "Discovered candidates"
            );
            Ok(json!({ "count": count }))
        }
        Err(e) => {
            error!(
                job_id = %job.id(),
                area_id = %area.area_id,
                attempt = job.attempt,
                error = %e,
                "Discovery failed"
            );
            Err(e.into_failure(persistence_max))
        }
    }
}

/// Queue entry point for visit jobs
pub async fn handle_visit(ctx: &CrawlContext, job: LeasedJob) -> JobResult {
    let persistence_max = ctx.policies.persistence_max_attempts;
    let visit: VisitJob = serde_json::from_value(job.data.clone())
        .map_err(|e| CrawlError::from(e).into_failure(persistence_max))?;

    match visit_place(ctx, &visit).await {
        Ok(place) => {
            debug!(job_id = %job.id(), place_id = %place.place_id, "Visited place");
            Ok(json!({
                "place_id": place.place_id,
                "updated_at": place.updated_at,
            }))
        }
        Err(e) => {
            let failure = e.into_failure(persistence_max);
            if job.is_final_attempt() || failure.disposition != FailureDisposition::Retry {
                error!(
                    job_id = %job.id(),
                    place_id = %visit.place_id,
                    name = %visit.name,
                    attempt = job.attempt,
                    error = %failure,
                    "Visit failed"
                );
            } else {
                warn!(
                    job_id = %job.id(),
                    place_id = %visit.place_id,
                    name = %visit.name,
                    attempt = job.attempt,
                    error = %failure,
                    "Visit attempt failed, will retry"
                );
            }
            Err(failure)
        }
    }
}
