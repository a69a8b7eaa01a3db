// Area domain types
//
// An area is a submitted geographic scope (center + radius). Every accepted
// submission is recorded as an Area and produces exactly one AreaJob.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Request to scan an area.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct NewArea {
    /// Latitude of the center, in degrees.
    pub lat: f64,
    /// Longitude of the center, in degrees.
    pub lng: f64,
    /// Search radius around the center, in meters.
    #[serde(alias = "radiusMeters")]
    pub radius_meters: f64,
}

/// Reasons a submitted area is rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AreaValidationError {
    #[error("lat must be a finite number between -90 and 90")]
    Latitude,
    #[error("lng must be a finite number between -180 and 180")]
    Longitude,
    #[error("radius_meters must be a finite number greater than 0")]
    Radius,
}

impl NewArea {
    pub fn new(lat: f64, lng: f64, radius_meters: f64) -> Self {
        Self {
            lat,
            lng,
            radius_meters,
        }
    }

    /// Check that the area describes a real place on the map.
    pub fn validate(&self) -> Result<(), AreaValidationError> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(AreaValidationError::Latitude);
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(AreaValidationError::Longitude);
        }
        if !self.radius_meters.is_finite() || self.radius_meters <= 0.0 {
            return Err(AreaValidationError::Radius);
        }
        Ok(())
    }
}

/// A recorded area submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct Area {
    /// Unique identifier for the area.
    pub id: Uuid,
    pub lat: f64,
    pub lng: f64,
    pub radius_meters: f64,
    /// Timestamp when the area was submitted.
    pub created_at: DateTime<Utc>,
}

/// Payload of a discovery job. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AreaJob {
    pub area_id: Uuid,
    pub lat: f64,
    pub lng: f64,
    pub radius_meters: f64,
    pub created_at: DateTime<Utc>,
}

impl From<&Area> for AreaJob {
    fn from(area: &Area) -> Self {
        Self {
            area_id: area.id,
            lat: area.lat,
            lng: area.lng,
            radius_meters: area.radius_meters,
            created_at: area.created_at,
        }
    }
}
