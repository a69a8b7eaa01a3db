// Place read routes
//
// Thin pass-through to the PlaceStore; no shaping beyond the filter.

use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    routing::get,
    Json, Router,
};

use placecrawl_core::{Place, PlaceFilter, PlaceStore};

use super::common::{bad_request, internal_error, not_found, ApiError, ListResponse};

/// App state for place routes
#[derive(Clone)]
pub struct AppState {
    pub places: Arc<dyn PlaceStore>,
}

impl AppState {
    pub fn new(places: Arc<dyn PlaceStore>) -> Self {
        Self { places }
    }
}

/// Create place routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/places", get(list_places))
        .route("/v1/places/:place_id", get(get_place))
        .with_state(state)
}

/// GET /v1/places - List places matching a filter
#[utoipa::path(
    get,
    path = "/v1/places",
    params(PlaceFilter),
    responses(
        (status = 200, description = "Matching places", body = ListResponse<Place>),
        (status = 400, description = "Invalid filter", body = super::ErrorResponse),
        (status = 500, description = "Internal server error", body = super::ErrorResponse)
    ),
    tag = "places"
)]
pub async fn list_places(
    State(state): State<AppState>,
    filter: Result<Query<PlaceFilter>, QueryRejection>,
) -> Result<Json<ListResponse<Place>>, ApiError> {
    let Query(filter) = filter.map_err(|e| bad_request(e.body_text()))?;
    let places = state
        .places
        .list(&filter)
        .await
        .map_err(|e| internal_error("Failed to list places", e))?;
    Ok(Json(ListResponse::new(places)))
}

/// GET /v1/places/{place_id} - Get one place
#[utoipa::path(
    get,
    path = "/v1/places/{place_id}",
    params(
        ("place_id" = String, Path, description = "Stable place identifier")
    ),
    responses(
        (status = 200, description = "Place found", body = Place),
        (status = 404, description = "Place not found", body = super::ErrorResponse),
        (status = 500, description = "Internal server error", body = super::ErrorResponse)
    ),
    tag = "places"
)]
pub async fn get_place(
    State(state): State<AppState>,
    Path(place_id): Path<String>,
) -> Result<Json<Place>, ApiError> {
    state
        .places
        .get(&place_id)
        .await
        .map_err(|e| internal_error("Failed to get place", e))?
        .map(Json)
        .ok_or_else(|| not_found(format!("place {place_id} not found")))
}
