// Extraction capability
//
// Rendering a third-party page and pulling fields out of it is a black box to
// the pipeline. Workers only see these two operations, so the extractor can be
// swapped for a remote service or a scripted fake in tests.

use async_trait::async_trait;

use crate::area::AreaJob;
use crate::place::{Candidate, PlaceDetails};

/// Error from the extraction capability
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExtractionError {
    /// Network failure, timeout or navigation error; worth retrying
    #[error("transient extraction error: {0}")]
    Transient(String),

    /// The resource is absent or its content is malformed; retrying won't help
    #[error("permanent extraction error: {0}")]
    Permanent(String),
}

impl ExtractionError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// One extraction session
///
/// A session is opened per job and closed when the job is done, whatever the
/// outcome. Sessions are never shared between jobs.
#[async_trait]
pub trait Extractor: Send {
    /// List candidates within an area. Best effort: may be incomplete or
    /// contain duplicates.
    async fn list(&mut self, area: &AreaJob) -> Result<Vec<Candidate>, ExtractionError>;

    /// Fetch detail fields for one candidate
    async fn detail(&mut self, source_ref: &str) -> Result<PlaceDetails, ExtractionError>;

    /// Release the session's resources
    async fn close(self: Box<Self>);
}

/// Opens extraction sessions
#[async_trait]
pub trait ExtractorFactory: Send + Sync + 'static {
    async fn open(&self) -> Result<Box<dyn Extractor>, ExtractionError>;
}
