// Crawl Core Abstractions
//
// Domain types and capability traits for the two-stage crawl pipeline
// (discover candidates in an area, then visit each one).
//
// Key design decisions:
// - place_id is the identity of a place everywhere; all writes key on it
// - Merging an observation never erases known values (see Place::merge)
// - Page extraction is a capability (Extractor), so workers stay free of page structure
// - Stores are traits so the control plane can run fully in memory in dev mode

pub mod area;
pub mod extractor;
pub mod geo;
pub mod place;
pub mod store;

// Telemetry (tracing subscriber + optional OTLP export)
pub mod telemetry;

// Re-exports for convenience
pub use area::{Area, AreaJob, AreaValidationError, NewArea};
pub use extractor::{ExtractionError, Extractor, ExtractorFactory};
pub use geo::{parse_coordinates, Coordinates};
pub use place::{Candidate, Place, PlaceDetails, PlaceFilter, PlaceUpsert, VisitJob};
pub use store::{AreaStore, PlaceStore, StoreError};
