// Scripted extractor
//
// An in-process ExtractorFactory that replays queued responses instead of
// talking to an extraction service. Used by the pipeline tests and handy for
// running the control plane without a real extractor.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use placecrawl_core::{
    AreaJob, Candidate, ExtractionError, Extractor, ExtractorFactory, PlaceDetails,
};

#[derive(Default)]
struct Script {
    listings: VecDeque<Result<Vec<Candidate>, ExtractionError>>,
    details: HashMap<String, VecDeque<Result<PlaceDetails, ExtractionError>>>,
    default_detail: Option<PlaceDetails>,
    panic_on_list: bool,
    panic_on_detail: HashSet<String>,
    list_delay: Duration,
    detail_delay: Duration,
    opened: usize,
    closed: usize,
    active_lists: usize,
    max_active_lists: usize,
    active_details: usize,
    max_active_details: usize,
    detail_calls: HashMap<String, usize>,
}

/// Factory whose sessions replay scripted responses
///
/// Listings are consumed in order, one per `list` call. Details are consumed
/// per source reference; once a reference runs out the default detail is
/// returned, or a permanent error when there is none.
#[derive(Clone, Default)]
pub struct ScriptedExtractorFactory {
    script: Arc<Mutex<Script>>,
}

impl ScriptedExtractorFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the result of the next `list` call
    pub fn push_listing(&self, listing: Result<Vec<Candidate>, ExtractionError>) -> &Self {
        self.script.lock().listings.push_back(listing);
        self
    }

    /// Queue the result of the next `detail` call for `source_ref`
    pub fn push_detail(
        &self,
        source_ref: &str,
        detail: Result<PlaceDetails, ExtractionError>,
    ) -> &Self {
        self.script
            .lock()
            .details
            .entry(source_ref.to_string())
            .or_default()
            .push_back(detail);
        self
    }

    /// Make every `list` call panic, like a crashing browser driver
    pub fn panic_on_list(&self) -> &Self {
        self.script.lock().panic_on_list = true;
        self
    }

    /// Make `detail` calls for `source_ref` panic
    pub fn panic_on_detail(&self, source_ref: &str) -> &Self {
        self.script
            .lock()
            .panic_on_detail
            .insert(source_ref.to_string());
        self
    }

    /// Detail returned once a source reference has nothing scripted
    pub fn with_default_detail(self, detail: PlaceDetails) -> Self {
        self.script.lock().default_detail = Some(detail);
        self
    }

    /// Make every `list` call take this long
    pub fn with_list_delay(self, delay: Duration) -> Self {
        self.script.lock().list_delay = delay;
        self
    }

    /// Make every `detail` call take this long
    pub fn with_detail_delay(self, delay: Duration) -> Self {
        self.script.lock().detail_delay = delay;
        self
    }

    /// Sessions opened so far
    pub fn opened(&self) -> usize {
        self.script.lock().opened
    }

    /// Sessions closed so far
    pub fn closed(&self) -> usize {
        self.script.lock().closed
    }

    /// Highest number of `list` calls that were in flight at once
    pub fn max_concurrent_lists(&self) -> usize {
        self.script.lock().max_active_lists
    }

    /// Highest number of `detail` calls that were in flight at once
    pub fn max_concurrent_details(&self) -> usize {
        self.script.lock().max_active_details
    }

    /// Number of `detail` calls made for `source_ref`
    pub fn detail_calls(&self, source_ref: &str) -> usize {
        self.script
            .lock()
            .detail_calls
            .get(source_ref)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl ExtractorFactory for ScriptedExtractorFactory {
    async fn open(&self) -> Result<Box<dyn Extractor>, ExtractionError> {
        self.script.lock().opened += 1;
        Ok(Box::new(ScriptedExtractor {
            script: Arc::clone(&self.script),
        }))
    }
}

struct ScriptedExtractor {
    script: Arc<Mutex<Script>>,
}

#[async_trait]
impl Extractor for ScriptedExtractor {
    async fn list(&mut self, _area: &AreaJob) -> Result<Vec<Candidate>, ExtractionError> {
        let delay = {
            let mut script = self.script.lock();
            if script.panic_on_list {
                drop(script);
                panic!("scripted list panic");
            }
            script.active_lists += 1;
            script.max_active_lists = script.max_active_lists.max(script.active_lists);
            script.list_delay
        };
        tokio::time::sleep(delay).await;

        let mut script = self.script.lock();
        script.active_lists -= 1;
        script
            .listings
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn detail(&mut self, source_ref: &str) -> Result<PlaceDetails, ExtractionError> {
        let delay = {
            let mut script = self.script.lock();
            if script.panic_on_detail.contains(source_ref) {
                drop(script);
                panic!("scripted detail panic for {source_ref}");
            }
            script.active_details += 1;
            script.max_active_details = script.max_active_details.max(script.active_details);
            *script
                .detail_calls
                .entry(source_ref.to_string())
                .or_default() += 1;
            script.detail_delay
        };
        tokio::time::sleep(delay).await;

        let mut script = self.script.lock();
        script.active_details -= 1;
        let scripted = script
            .details
            .get_mut(source_ref)
            .and_then(|queue| queue.pop_front());
        match scripted {
            Some(result) => result,
            None => script.default_detail.clone().ok_or_else(|| {
                ExtractionError::Permanent(format!("no detail scripted for {source_ref}"))
            }),
        }
    }

    async fn close(self: Box<Self>) {
        self.script.lock().closed += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn area() -> AreaJob {
        AreaJob {
            area_id: Uuid::now_v7(),
            lat: 27.7,
            lng: 85.3,
            radius_meters: 500.0,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_replays_in_order() {
        let factory = ScriptedExtractorFactory::new();
        factory
            .push_detail("ref", Err(ExtractionError::Transient("timeout".into())))
            .push_detail(
                "ref",
                Ok(PlaceDetails {
                    rating: Some(4.0),
                    ..Default::default()
                }),
            );

        let mut session = factory.open().await.unwrap();
        assert!(session.detail("ref").await.unwrap_err().is_transient());
        assert_eq!(session.detail("ref").await.unwrap().rating, Some(4.0));
        assert!(matches!(
            session.detail("ref").await,
            Err(ExtractionError::Permanent(_))
        ));
        assert!(session.list(&area()).await.unwrap().is_empty());
        session.close().await;

        assert_eq!(factory.opened(), 1);
        assert_eq!(factory.closed(), 1);
        assert_eq!(factory.detail_calls("ref"), 3);
    }
}
