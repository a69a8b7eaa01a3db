// Crawl error taxonomy
// Decision: Every failure is classified once, here, into a queue disposition

use placecrawl_core::{AreaValidationError, ExtractionError, StoreError};
use placecrawl_durable::{JobFailure, QueueError};

/// Failure of a discovery or visit job
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    /// Network, timeout or navigation failure in the extractor
    #[error("transient extraction error: {0}")]
    TransientExtraction(String),

    /// Resource missing or malformed
    #[error("permanent extraction error: {0}")]
    PermanentExtraction(String),

    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),

    /// Job payload could not be decoded
    #[error("invalid job payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}

impl From<ExtractionError> for CrawlError {
    fn from(e: ExtractionError) -> Self {
        match e {
            ExtractionError::Transient(msg) => Self::TransientExtraction(msg),
            ExtractionError::Permanent(msg) => Self::PermanentExtraction(msg),
        }
    }
}

impl CrawlError {
    /// Map to the failure the queue records for this attempt
    ///
    /// Transient extraction errors follow the job's own retry policy,
    /// persistence errors get at most `persistence_max_attempts` in total,
    /// anything else fails the job immediately.
    pub fn into_failure(self, persistence_max_attempts: u32) -> JobFailure {
        let message = self.to_string();
        match self {
            Self::TransientExtraction(_) => JobFailure::retry(message),
            Self::Persistence(_) => JobFailure::retry_up_to(message, persistence_max_attempts),
            Self::PermanentExtraction(_) | Self::InvalidPayload(_) | Self::Queue(_) => {
                JobFailure::terminal(message)
            }
        }
    }
}

/// Failure to accept an area submission
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("invalid area: {0}")]
    Invalid(#[from] AreaValidationError),

    #[error("failed to record area: {0}")]
    Store(#[from] StoreError),

    #[error("failed to enqueue discovery: {0}")]
    Queue(#[from] QueueError),
}
