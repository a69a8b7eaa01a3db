// PostgreSQL storage implementation
// Decision: Merge in Rust (Place::merge) under a row lock so both backends share one rule set
// Decision: Insert races resolve with ON CONFLICT DO NOTHING followed by a locked re-read

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use placecrawl_core::{
    Area, AreaStore, NewArea, Place, PlaceFilter, PlaceStore, PlaceUpsert, StoreError,
};

/// Place row as stored in the database
#[derive(Debug, Clone, sqlx::FromRow)]
struct PlaceRow {
    place_id: String,
    name: String,
    lat: Option<f64>,
    lng: Option<f64>,
    rating: Option<f64>,
    price_level: Option<String>,
    address: Option<String>,
    is_open: Option<bool>,
    images: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PlaceRow> for Place {
    fn from(row: PlaceRow) -> Self {
        Self {
            place_id: row.place_id,
            name: row.name,
            lat: row.lat,
            lng: row.lng,
            rating: row.rating,
            price_level: row.price_level,
            address: row.address,
            is_open: row.is_open,
            images: row.images,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Area row as stored in the database
#[derive(Debug, Clone, sqlx::FromRow)]
struct AreaRow {
    id: Uuid,
    lat: f64,
    lng: f64,
    radius_meters: f64,
    created_at: DateTime<Utc>,
}

impl From<AreaRow> for Area {
    fn from(row: AreaRow) -> Self {
        Self {
            id: row.id,
            lat: row.lat,
            lng: row.lng,
            radius_meters: row.radius_meters,
            created_at: row.created_at,
        }
    }
}

const PLACE_COLUMNS: &str = "place_id, name, lat, lng, rating, price_level, address, is_open, \
     images, created_at, updated_at";

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

/// Escape LIKE wildcards so search text matches literally
fn like_pattern(search: &str) -> String {
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// PostgreSQL database for places and areas
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect and apply pending migrations
    pub async fn from_url(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;
        info!("Database migrations applied");

        Ok(Self { pool })
    }

    /// Wrap an existing pool; migrations must already be applied
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn lock_place(
        tx: &mut Transaction<'_, Postgres>,
        place_id: &str,
    ) -> Result<Option<Place>, StoreError> {
        let row: Option<PlaceRow> = sqlx::query_as(&format!(
            "SELECT {PLACE_COLUMNS} FROM places WHERE place_id = $1 FOR UPDATE"
        ))
        .bind(place_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_err)?;

        Ok(row.map(Place::from))
    }

    async fn write_place(
        tx: &mut Transaction<'_, Postgres>,
        place: &Place,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE places
            SET name = $2, lat = $3, lng = $4, rating = $5, price_level = $6,
                address = $7, is_open = $8, images = $9, updated_at = $10
            WHERE place_id = $1
            "#,
        )
        .bind(&place.place_id)
        .bind(&place.name)
        .bind(place.lat)
        .bind(place.lng)
        .bind(place.rating)
        .bind(&place.price_level)
        .bind(&place.address)
        .bind(place.is_open)
        .bind(&place.images)
        .bind(place.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}

#[async_trait]
impl PlaceStore for Database {
    async fn upsert(&self, upsert: PlaceUpsert) -> Result<Place, StoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let place = match Self::lock_place(&mut tx, &upsert.place_id).await? {
            Some(existing) => merge_and_write(&mut tx, existing, &upsert, now).await?,
            None => {
                let fresh = Place::from_upsert(&upsert, now);
                let inserted = sqlx::query(
                    r#"
                    INSERT INTO places (place_id, name, lat, lng, rating, price_level,
                                        address, is_open, images, created_at, updated_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                    ON CONFLICT (place_id) DO NOTHING
                    "#,
                )
                .bind(&fresh.place_id)
                .bind(&fresh.name)
                .bind(fresh.lat)
                .bind(fresh.lng)
                .bind(fresh.rating)
                .bind(&fresh.price_level)
                .bind(&fresh.address)
                .bind(fresh.is_open)
                .bind(&fresh.images)
                .bind(fresh.created_at)
                .bind(fresh.updated_at)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;

                if inserted.rows_affected() == 1 {
                    fresh
                } else {
                    // Lost the insert race; merge into the winner's row
                    let existing = Self::lock_place(&mut tx, &upsert.place_id)
                        .await?
                        .ok_or_else(|| {
                            StoreError::Database(format!(
                                "place {} vanished during upsert",
                                upsert.place_id
                            ))
                        })?;
                    merge_and_write(&mut tx, existing, &upsert, now).await?
                }
            }
        };

        tx.commit().await.map_err(db_err)?;
        debug!(place_id = %place.place_id, "upserted place");
        Ok(place)
    }

    async fn get(&self, place_id: &str) -> Result<Option<Place>, StoreError> {
        let row: Option<PlaceRow> = sqlx::query_as(&format!(
            "SELECT {PLACE_COLUMNS} FROM places WHERE place_id = $1"
        ))
        .bind(place_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(Place::from))
    }

    async fn list(&self, filter: &PlaceFilter) -> Result<Vec<Place>, StoreError> {
        let search = filter
            .search
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(like_pattern);

        let rows: Vec<PlaceRow> = sqlx::query_as(&format!(
            r#"
            SELECT {PLACE_COLUMNS}
            FROM places
            WHERE ($1::text IS NULL OR name ILIKE $1)
              AND ($2::float8 IS NULL OR rating >= $2)
              AND ($3::bool IS NULL OR is_open = $3)
            ORDER BY name, place_id
            "#
        ))
        .bind(search)
        .bind(filter.min_rating)
        .bind(filter.open_now)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(Place::from).collect())
    }
}

async fn merge_and_write(
    tx: &mut Transaction<'_, Postgres>,
    mut place: Place,
    upsert: &PlaceUpsert,
    now: DateTime<Utc>,
) -> Result<Place, StoreError> {
    if place.merge(upsert, now) {
        Database::write_place(tx, &place).await?;
    }
    Ok(place)
}

#[async_trait]
impl AreaStore for Database {
    async fn create_area(&self, area: NewArea) -> Result<Area, StoreError> {
        let row: AreaRow = sqlx::query_as(
            r#"
            INSERT INTO areas (id, lat, lng, radius_meters)
            VALUES ($1, $2, $3, $4)
            RETURNING id, lat, lng, radius_meters, created_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(area.lat)
        .bind(area.lng)
        .bind(area.radius_meters)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.into())
    }

    async fn get_area(&self, id: Uuid) -> Result<Option<Area>, StoreError> {
        let row: Option<AreaRow> = sqlx::query_as(
            "SELECT id, lat, lng, radius_meters, created_at FROM areas WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(Area::from))
    }

    async fn delete_area(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM areas WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_areas(&self) -> Result<Vec<Area>, StoreError> {
        let rows: Vec<AreaRow> = sqlx::query_as(
            "SELECT id, lat, lng, radius_meters, created_at FROM areas ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(Area::from).collect())
    }
}
