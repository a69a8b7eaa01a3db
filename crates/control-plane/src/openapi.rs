// OpenAPI document generation
//
// Used by the API server (for Swagger UI) and the export-openapi binary
// (for static export).

use crate::api;
use crate::api::{ErrorResponse, ListResponse};
use placecrawl_core::{Area, NewArea, Place};
use utoipa::OpenApi;

/// OpenAPI documentation for the Placecrawl API
#[derive(OpenApi)]
#[openapi(
    paths(
        api::areas::submit_area,
        api::areas::list_areas,
        api::places::list_places,
        api::places::get_place,
        api::queues::queue_stats,
        api::queues::list_failed,
    ),
    components(
        schemas(
            NewArea, Area, Place,
            ErrorResponse,
            api::areas::SubmitAreaResponse,
            api::queues::QueueStatsResponse,
            api::queues::FailedJob,
            ListResponse<Area>,
            ListResponse<Place>,
            ListResponse<api::queues::FailedJob>,
        )
    ),
    tags(
        (name = "areas", description = "Area submission endpoints"),
        (name = "places", description = "Place read endpoints"),
        (name = "queues", description = "Crawl queue inspection endpoints")
    ),
    info(
        title = "Placecrawl API",
        version = "0.1.0",
        description = "API for submitting areas to crawl and reading the places found",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    )
)]
pub struct ApiDoc;

impl ApiDoc {
    /// Generate the OpenAPI document as a pretty-printed JSON string
    pub fn to_json() -> Result<String, serde_json::Error> {
        Self::openapi().to_pretty_json()
    }
}
