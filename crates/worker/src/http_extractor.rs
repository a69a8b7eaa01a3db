// HTTP extraction client
// Decision: Page rendering lives in a separate extraction service; this is a thin JSON client
//
// Contract:
//   POST {base}/list   {lat, lng, radius_meters} -> [{place_id, name, source_ref}]
//   POST {base}/detail {source_ref}              -> {rating?, price_level?, address?, is_open?, images}
//
// Timeouts, connect failures, 5xx and 429 are transient; other 4xx and
// bodies that don't decode are permanent.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use placecrawl_core::{
    AreaJob, Candidate, ExtractionError, Extractor, ExtractorFactory, PlaceDetails,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct ListRequest {
    lat: f64,
    lng: f64,
    radius_meters: f64,
}

#[derive(Serialize)]
struct DetailRequest<'a> {
    source_ref: &'a str,
}

/// Opens sessions against an extraction service
#[derive(Clone)]
pub struct HttpExtractorFactory {
    base_url: String,
    http: reqwest::Client,
}

impl HttpExtractorFactory {
    /// Create a factory for the service at `base_url`
    ///
    /// `timeout` bounds each request end to end.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ExtractorFactory for HttpExtractorFactory {
    async fn open(&self) -> Result<Box<dyn Extractor>, ExtractionError> {
        let session = Uuid::now_v7();
        debug!(%session, base_url = %self.base_url, "Opened extractor session");
        Ok(Box::new(HttpExtractor {
            base_url: self.base_url.clone(),
            http: self.http.clone(),
            session,
        }))
    }
}

/// One extraction session over HTTP
pub struct HttpExtractor {
    base_url: String,
    http: reqwest::Client,
    session: Uuid,
}

impl HttpExtractor {
    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ExtractionError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .header("x-extractor-session", self.session.to_string())
            .json(body)
            .send()
            .await
            .map_err(|e| classify_request_error(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &url, &message));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| classify_request_error(&url, e))?;
        serde_json::from_slice(&bytes).map_err(|e| {
            ExtractionError::Permanent(format!("malformed response from {url}: {e}"))
        })
    }
}

#[async_trait]
impl Extractor for HttpExtractor {
    async fn list(&mut self, area: &AreaJob) -> Result<Vec<Candidate>, ExtractionError> {
        let request = ListRequest {
            lat: area.lat,
            lng: area.lng,
            radius_meters: area.radius_meters,
        };
        self.post("/list", &request).await
    }

    async fn detail(&mut self, source_ref: &str) -> Result<PlaceDetails, ExtractionError> {
        self.post("/detail", &DetailRequest { source_ref }).await
    }

    async fn close(self: Box<Self>) {
        debug!(session = %self.session, "Closed extractor session");
    }
}

fn classify_request_error(url: &str, e: reqwest::Error) -> ExtractionError {
    if e.is_timeout() {
        ExtractionError::Transient(format!("request to {url} timed out"))
    } else if e.is_connect() {
        ExtractionError::Transient(format!("failed to connect to {url}"))
    } else if e.is_decode() || e.is_builder() {
        ExtractionError::Permanent(format!("request to {url} failed: {e}"))
    } else {
        ExtractionError::Transient(format!("request to {url} failed: {e}"))
    }
}

fn classify_status(status: StatusCode, url: &str, body: &str) -> ExtractionError {
    let message = if body.is_empty() {
        format!("{url} returned {status}")
    } else {
        format!("{url} returned {status}: {body}")
    };

    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        ExtractionError::Transient(message)
    } else {
        ExtractionError::Permanent(message)
    }
}
