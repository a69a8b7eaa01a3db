// Coordinate parsing from source references
//
// Map page URLs carry the place position either as a `!3d<lat>!4d<lng>` data
// segment or as an `@<lat>,<lng>` viewport segment. The data segment is
// preferred because the viewport is only the map center.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

static RE_DATA_SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"!3d(-?\d+(?:\.\d+)?)!4d(-?\d+(?:\.\d+)?)").expect("valid coordinate pattern")
});
static RE_VIEWPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@(-?\d+(?:\.\d+)?),(-?\d+(?:\.\d+)?)").expect("valid coordinate pattern")
});

/// A WGS84 position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    /// Build coordinates, rejecting values off the globe
    pub fn new(lat: f64, lng: f64) -> Option<Self> {
        let valid = lat.is_finite()
            && lng.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lng);
        valid.then_some(Self { lat, lng })
    }
}

/// Best-effort coordinates from a source reference
///
/// Returns `None` when no valid position is present; never defaults to 0,0.
pub fn parse_coordinates(source_ref: &str) -> Option<Coordinates> {
    [&*RE_DATA_SEGMENT, &*RE_VIEWPORT]
        .into_iter()
        .find_map(|re| capture_pair(re, source_ref))
}

fn capture_pair(re: &Regex, haystack: &str) -> Option<Coordinates> {
    let caps = re.captures(haystack)?;
    let lat = caps.get(1)?.as_str().parse().ok()?;
    let lng = caps.get(2)?.as_str().parse().ok()?;
    Coordinates::new(lat, lng)
}
