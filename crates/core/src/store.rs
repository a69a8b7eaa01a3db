// Store traits
//
// The pipeline only relies on atomic per-key upsert for places; no multi-key
// transactions are needed. Implementations live in placecrawl-storage.

use async_trait::async_trait;
use uuid::Uuid;

use crate::area::{Area, NewArea};
use crate::place::{Place, PlaceFilter, PlaceUpsert};

/// Error from a store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// Stored data could not be decoded
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Persistence for places, keyed by place_id
#[async_trait]
pub trait PlaceStore: Send + Sync + 'static {
    /// Create or merge a place, returning the stored record
    ///
    /// Each call is one atomic read-merge-write for its key, so concurrent
    /// upserts to the same place serialize instead of interleaving fields.
    async fn upsert(&self, upsert: PlaceUpsert) -> Result<Place, StoreError>;

    async fn get(&self, place_id: &str) -> Result<Option<Place>, StoreError>;

    /// Places matching the filter, ordered by name
    async fn list(&self, filter: &PlaceFilter) -> Result<Vec<Place>, StoreError>;
}

/// Persistence for submitted areas
#[async_trait]
pub trait AreaStore: Send + Sync + 'static {
    async fn create_area(&self, area: NewArea) -> Result<Area, StoreError>;

    async fn get_area(&self, id: Uuid) -> Result<Option<Area>, StoreError>;

    /// Remove an area record; returns whether it existed
    async fn delete_area(&self, id: Uuid) -> Result<bool, StoreError>;

    /// All areas, newest first
    async fn list_areas(&self) -> Result<Vec<Area>, StoreError>;
}
