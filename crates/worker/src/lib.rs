// Placecrawl Worker
//
// Runs the two crawl stages on top of the durable job queue:
// - discovery: one AreaJob -> deduplicated VisitJobs (serialized by default)
// - visit: one VisitJob -> merged place record (parallel, bounded)
//
// Extraction goes through the ExtractorFactory capability; HttpExtractorFactory
// talks to an extraction service, ScriptedExtractorFactory replays canned
// responses.

pub mod config;
pub mod error;
pub mod handlers;
pub mod http_extractor;
pub mod pipeline;
pub mod scripted;

pub use config::{CrawlPolicies, WorkerConfig};
pub use error::{CrawlError, SubmitError};
pub use handlers::{
    dedupe_candidates, CrawlContext, DISCOVERY_QUEUE, DISCOVER_AREA, VISIT_PLACE, VISIT_QUEUE,
};
pub use http_extractor::{HttpExtractor, HttpExtractorFactory};
pub use pipeline::{AreaSubmitter, CrawlPipeline, Submission};
pub use scripted::ScriptedExtractorFactory;
