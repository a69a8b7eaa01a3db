// Storage backend abstraction
// Decision: Use enum dispatch for choosing the backend, trait objects for handing stores out
//
// A StorageBackend owns the place/area stores and the job queue client that
// belong together: PostgreSQL for all three, or in-memory for all three.

use std::sync::Arc;

use anyhow::Result;
use sqlx::PgPool;

use placecrawl_core::{AreaStore, PlaceStore};
use placecrawl_durable::{InMemoryJobQueue, JobQueue, PostgresJobQueue};

use super::memory::InMemoryDatabase;
use super::postgres::Database;

/// Storage backend that can be either PostgreSQL or in-memory
#[derive(Clone)]
pub enum StorageBackend {
    /// PostgreSQL database (production)
    Postgres {
        db: Database,
        queue: Arc<PostgresJobQueue>,
    },
    /// In-memory database (dev mode)
    InMemory {
        db: Arc<InMemoryDatabase>,
        queue: Arc<InMemoryJobQueue>,
    },
}

impl StorageBackend {
    /// Create a PostgreSQL storage backend from a database URL
    ///
    /// Applies migrations before returning.
    pub async fn postgres(database_url: &str) -> Result<Self> {
        let db = Database::from_url(database_url).await?;
        let queue = Arc::new(PostgresJobQueue::new(db.pool().clone()));
        Ok(Self::Postgres { db, queue })
    }

    /// Create an in-memory storage backend
    pub fn in_memory() -> Self {
        Self::InMemory {
            db: Arc::new(InMemoryDatabase::new()),
            queue: Arc::new(InMemoryJobQueue::new()),
        }
    }

    /// Check if this is dev mode (in-memory)
    pub fn is_dev_mode(&self) -> bool {
        matches!(self, Self::InMemory { .. })
    }

    /// Get the PostgreSQL pool if using PostgreSQL backend
    /// Returns None for in-memory backend
    pub fn pool(&self) -> Option<&PgPool> {
        match self {
            Self::Postgres { db, .. } => Some(db.pool()),
            Self::InMemory { .. } => None,
        }
    }

    pub fn places(&self) -> Arc<dyn PlaceStore> {
        match self {
            Self::Postgres { db, .. } => Arc::new(db.clone()),
            Self::InMemory { db, .. } => db.clone(),
        }
    }

    pub fn areas(&self) -> Arc<dyn AreaStore> {
        match self {
            Self::Postgres { db, .. } => Arc::new(db.clone()),
            Self::InMemory { db, .. } => db.clone(),
        }
    }

    /// Queue client sharing this backend's storage
    pub fn job_queue(&self) -> Arc<dyn JobQueue> {
        match self {
            Self::Postgres { queue, .. } => queue.clone(),
            Self::InMemory { queue, .. } => queue.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use placecrawl_core::{NewArea, PlaceUpsert};

    #[tokio::test]
    async fn test_in_memory_backend_shares_state() {
        let backend = StorageBackend::in_memory();
        assert!(backend.is_dev_mode());
        assert!(backend.pool().is_none());

        backend
            .places()
            .upsert(PlaceUpsert {
                place_id: "p1".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(backend.places().get("p1").await.unwrap().is_some());

        let area = backend
            .areas()
            .create_area(NewArea::new(1.0, 2.0, 3.0))
            .await
            .unwrap();
        assert_eq!(backend.areas().list_areas().await.unwrap()[0].id, area.id);

        // Same queue instance on every call
        backend
            .job_queue()
            .enqueue(
                "q",
                placecrawl_durable::NewJob::new(
                    "t",
                    serde_json::json!({}),
                    placecrawl_durable::RetryPolicy::no_retry(),
                ),
            )
            .await
            .unwrap();
        assert_eq!(backend.job_queue().stats("q").await.unwrap().waiting, 1);
    }
}
