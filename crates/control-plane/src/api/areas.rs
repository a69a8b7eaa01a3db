// Area submission HTTP routes
// Decision: Submission returns 202 as soon as the discovery job is enqueued

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use placecrawl_core::{Area, AreaStore, NewArea};
use placecrawl_worker::{AreaSubmitter, SubmitError};

use super::common::{bad_request, internal_error, ApiError, ListResponse};

/// Accepted area submission
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmitAreaResponse {
    /// Id of the recorded area.
    pub area_id: Uuid,
    /// Id of the discovery job scanning the area.
    pub job_id: Uuid,
}

/// App state for area routes
#[derive(Clone)]
pub struct AppState {
    pub submitter: AreaSubmitter,
    pub areas: Arc<dyn AreaStore>,
}

impl AppState {
    pub fn new(submitter: AreaSubmitter, areas: Arc<dyn AreaStore>) -> Self {
        Self { submitter, areas }
    }
}

/// Create area routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/areas", post(submit_area).get(list_areas))
        .with_state(state)
}

/// POST /v1/areas - Submit an area for crawling
#[utoipa::path(
    post,
    path = "/v1/areas",
    request_body = NewArea,
    responses(
        (status = 202, description = "Area accepted, discovery enqueued", body = SubmitAreaResponse),
        (status = 400, description = "Invalid area", body = super::ErrorResponse),
        (status = 500, description = "Internal server error", body = super::ErrorResponse)
    ),
    tag = "areas"
)]
pub async fn submit_area(
    State(state): State<AppState>,
    payload: Result<Json<NewArea>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitAreaResponse>), ApiError> {
    let Json(area) = payload.map_err(|e| bad_request(e.body_text()))?;

    let submission = state.submitter.submit(area).await.map_err(|e| match e {
        SubmitError::Invalid(reason) => bad_request(reason.to_string()),
        other => internal_error("Failed to submit area", other),
    })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitAreaResponse {
            area_id: submission.area.id,
            job_id: submission.job_id,
        }),
    ))
}

/// GET /v1/areas - List submitted areas, newest first
#[utoipa::path(
    get,
    path = "/v1/areas",
    responses(
        (status = 200, description = "List of areas", body = ListResponse<Area>),
        (status = 500, description = "Internal server error", body = super::ErrorResponse)
    ),
    tag = "areas"
)]
pub async fn list_areas(
    State(state): State<AppState>,
) -> Result<Json<ListResponse<Area>>, ApiError> {
    let areas = state
        .areas
        .list_areas()
        .await
        .map_err(|e| internal_error("Failed to list areas", e))?;
    Ok(Json(ListResponse::new(areas)))
}
