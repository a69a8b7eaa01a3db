// Place domain types
//
// A place is identified by the collaborator's stable place_id. Discovery
// yields Candidates, each unique candidate becomes a VisitJob, and a visit
// merges its findings into the stored Place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[cfg(feature = "openapi")]
use utoipa::{IntoParams, ToSchema};

use crate::geo::Coordinates;

/// A minimally identified place found during discovery. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    pub place_id: String,
    pub name: String,
    /// Reference the extractor can resolve to the place's detail page.
    pub source_ref: String,
}

/// Payload of a visit job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VisitJob {
    pub place_id: String,
    pub source_ref: String,
    pub name: String,
    /// Attempt counter at creation; the queue tracks later attempts.
    pub attempt: u32,
}

impl From<Candidate> for VisitJob {
    fn from(candidate: Candidate) -> Self {
        Self {
            place_id: candidate.place_id,
            source_ref: candidate.source_ref,
            name: candidate.name,
            attempt: 1,
        }
    }
}

/// Fields returned by the extractor for one place. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlaceDetails {
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub price_level: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub is_open: Option<bool>,
    #[serde(default)]
    pub images: Vec<String>,
}

/// Incoming observation of a place, merged into the stored record.
///
/// `None` fields, an empty name and an empty image list mean "not observed"
/// and never overwrite a known value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlaceUpsert {
    pub place_id: String,
    pub name: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub rating: Option<f64>,
    pub price_level: Option<String>,
    pub address: Option<String>,
    pub is_open: Option<bool>,
    pub images: Vec<String>,
}

impl PlaceUpsert {
    /// Combine a visit's payload, its fallback coordinates and the extracted details
    pub fn from_visit(
        job: &VisitJob,
        coordinates: Option<Coordinates>,
        details: PlaceDetails,
    ) -> Self {
        Self {
            place_id: job.place_id.clone(),
            name: Some(job.name.clone()).filter(|n| !n.trim().is_empty()),
            coordinates,
            rating: details.rating,
            price_level: details.price_level,
            address: details.address,
            is_open: details.is_open,
            images: details.images,
        }
    }
}

/// Stored place record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct Place {
    /// Stable identifier from the source; primary key.
    pub place_id: String,
    pub name: String,
    /// Latitude, unknown until a visit could parse or observe it.
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub rating: Option<f64>,
    /// Price band as shown by the source, e.g. "$$".
    pub price_level: Option<String>,
    pub address: Option<String>,
    pub is_open: Option<bool>,
    /// Image URLs in source order.
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Place {
    /// Create a record from the first observation of a place
    pub fn from_upsert(upsert: &PlaceUpsert, now: DateTime<Utc>) -> Self {
        Self {
            place_id: upsert.place_id.clone(),
            name: upsert.name.clone().unwrap_or_default(),
            lat: upsert.coordinates.map(|c| c.lat),
            lng: upsert.coordinates.map(|c| c.lng),
            rating: upsert.rating,
            price_level: upsert.price_level.clone(),
            address: upsert.address.clone(),
            is_open: upsert.is_open,
            images: upsert.images.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge an observation into this record
    ///
    /// Only observed fields are written. `updated_at` moves only when a value
    /// actually changed, so merging the same observation twice is a no-op.
    /// Returns whether anything changed.
    pub fn merge(&mut self, upsert: &PlaceUpsert, now: DateTime<Utc>) -> bool {
        let mut changed = false;

        if let Some(name) = upsert.name.as_ref().filter(|n| !n.trim().is_empty()) {
            changed |= set_if_different(&mut self.name, name.clone());
        }
        if let Some(coordinates) = upsert.coordinates {
            changed |= set_if_different(&mut self.lat, Some(coordinates.lat));
            changed |= set_if_different(&mut self.lng, Some(coordinates.lng));
        }
        if upsert.rating.is_some() {
            changed |= set_if_different(&mut self.rating, upsert.rating);
        }
        if upsert.price_level.is_some() {
            changed |= set_if_different(&mut self.price_level, upsert.price_level.clone());
        }
        if upsert.address.is_some() {
            changed |= set_if_different(&mut self.address, upsert.address.clone());
        }
        if upsert.is_open.is_some() {
            changed |= set_if_different(&mut self.is_open, upsert.is_open);
        }
        if !upsert.images.is_empty() {
            changed |= set_if_different(&mut self.images, upsert.images.clone());
        }

        if changed {
            self.updated_at = now;
        }
        changed
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(Coordinates { lat, lng }),
            _ => None,
        }
    }
}

fn set_if_different<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}

/// Read filter for places. Unset fields do not constrain.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(IntoParams))]
#[cfg_attr(feature = "openapi", into_params(parameter_in = Query))]
pub struct PlaceFilter {
    /// Case-insensitive substring of the place name.
    pub search: Option<String>,
    /// Minimum rating, inclusive. Unrated places never match.
    pub min_rating: Option<f64>,
    /// Required open state.
    pub open_now: Option<bool>,
}

impl PlaceFilter {
    pub fn matches(&self, place: &Place) -> bool {
        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            if !place.name.to_lowercase().contains(&search.to_lowercase()) {
                return false;
            }
        }
        if let Some(min) = self.min_rating {
            if !place.rating.is_some_and(|r| r >= min) {
                return false;
            }
        }
        if let Some(open) = self.open_now {
            if place.is_open != Some(open) {
                return false;
            }
        }
        true
    }
}
