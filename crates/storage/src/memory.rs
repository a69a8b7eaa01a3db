// In-memory storage implementation for dev mode
// Decision: Use parking_lot for thread-safe access
// Decision: A place upsert holds the write lock for the whole read-merge-write
//
// All data is stored in memory and lost on restart.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use placecrawl_core::{
    Area, AreaStore, NewArea, Place, PlaceFilter, PlaceStore, PlaceUpsert, StoreError,
};

/// In-memory database for dev mode and tests
#[derive(Default)]
pub struct InMemoryDatabase {
    places: RwLock<HashMap<String, Place>>,
    areas: RwLock<HashMap<Uuid, Area>>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn place_count(&self) -> usize {
        self.places.read().len()
    }
}

#[async_trait]
impl PlaceStore for InMemoryDatabase {
    async fn upsert(&self, upsert: PlaceUpsert) -> Result<Place, StoreError> {
        let now = Utc::now();
        let mut places = self.places.write();

        let place = places
            .entry(upsert.place_id.clone())
            .and_modify(|existing| {
                existing.merge(&upsert, now);
            })
            .or_insert_with(|| Place::from_upsert(&upsert, now));

        Ok(place.clone())
    }

    async fn get(&self, place_id: &str) -> Result<Option<Place>, StoreError> {
        Ok(self.places.read().get(place_id).cloned())
    }

    async fn list(&self, filter: &PlaceFilter) -> Result<Vec<Place>, StoreError> {
        let mut places: Vec<Place> = self
            .places
            .read()
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();

        places.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then_with(|| a.place_id.cmp(&b.place_id))
        });
        Ok(places)
    }
}

#[async_trait]
impl AreaStore for InMemoryDatabase {
    async fn create_area(&self, area: NewArea) -> Result<Area, StoreError> {
        let row = Area {
            id: Uuid::now_v7(),
            lat: area.lat,
            lng: area.lng,
            radius_meters: area.radius_meters,
            created_at: Utc::now(),
        };
        self.areas.write().insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_area(&self, id: Uuid) -> Result<Option<Area>, StoreError> {
        Ok(self.areas.read().get(&id).cloned())
    }

    async fn delete_area(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.areas.write().remove(&id).is_some())
    }

    async fn list_areas(&self) -> Result<Vec<Area>, StoreError> {
        let mut areas: Vec<Area> = self.areas.read().values().cloned().collect();
        // v7 ids are time-ordered, which breaks created_at ties
        areas.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(areas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use placecrawl_core::{Coordinates, PlaceDetails, VisitJob};
    use std::sync::Arc;

    fn p1_first_visit() -> PlaceUpsert {
        let job = VisitJob {
            place_id: "p1".to_string(),
            source_ref: "https://maps.example/place/p1/data=!3d27.7031!4d85.3566".to_string(),
            name: "Himalayan Java".to_string(),
            attempt: 1,
        };
        PlaceUpsert::from_visit(
            &job,
            placecrawl_core::parse_coordinates(&job.source_ref),
            PlaceDetails {
                rating: Some(4.5),
                is_open: Some(true),
                images: vec!["a.jpg".to_string()],
                address: Some("Thamel".to_string()),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_first_visit_creates_place() {
        let db = InMemoryDatabase::new();
        db.upsert(p1_first_visit()).await.unwrap();

        let place = db.get("p1").await.unwrap().unwrap();
        assert_eq!(place.rating, Some(4.5));
        assert_eq!(place.is_open, Some(true));
        assert_eq!(place.images, vec!["a.jpg"]);
        assert_eq!(
            place.coordinates(),
            Some(Coordinates {
                lat: 27.7031,
                lng: 85.3566
            })
        );
    }

    #[tokio::test]
    async fn test_second_visit_only_updates_rating() {
        let db = InMemoryDatabase::new();
        let first = db.upsert(p1_first_visit()).await.unwrap();

        let second = PlaceUpsert {
            place_id: "p1".to_string(),
            rating: Some(4.7),
            ..Default::default()
        };
        let place = db.upsert(second).await.unwrap();

        assert_eq!(place.rating, Some(4.7));
        assert_eq!(place.images, first.images);
        assert_eq!(place.is_open, first.is_open);
        assert_eq!(place.address, first.address);
        assert_eq!(place.coordinates(), first.coordinates());
        assert_eq!(place.created_at, first.created_at);
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let db = InMemoryDatabase::new();
        let once = db.upsert(p1_first_visit()).await.unwrap();
        let twice = db.upsert(p1_first_visit()).await.unwrap();

        assert_eq!(once, twice);
        assert_eq!(db.place_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_upserts_do_not_tear() {
        let f1 = PlaceUpsert {
            place_id: "p1".to_string(),
            name: Some("Alpha".to_string()),
            rating: Some(3.0),
            is_open: Some(false),
            images: vec!["one.jpg".to_string()],
            ..Default::default()
        };
        let f2 = PlaceUpsert {
            place_id: "p1".to_string(),
            name: Some("Beta".to_string()),
            rating: Some(5.0),
            is_open: Some(true),
            images: vec!["two.jpg".to_string(), "three.jpg".to_string()],
            ..Default::default()
        };

        for _ in 0..20 {
            let db = Arc::new(InMemoryDatabase::new());
            let handles: Vec<_> = [f1.clone(), f2.clone()]
                .into_iter()
                .map(|f| {
                    let db = db.clone();
                    tokio::spawn(async move { db.upsert(f).await })
                })
                .collect();
            for result in futures::future::join_all(handles).await {
                result.unwrap().unwrap();
            }

            let place = db.get("p1").await.unwrap().unwrap();
            let all_alpha = place.name == "Alpha"
                && place.rating == Some(3.0)
                && place.is_open == Some(false)
                && place.images == f1.images;
            let all_beta = place.name == "Beta"
                && place.rating == Some(5.0)
                && place.is_open == Some(true)
                && place.images == f2.images;
            assert!(all_alpha || all_beta, "torn write: {place:?}");
        }
    }

    #[tokio::test]
    async fn test_list_with_filter() {
        let db = InMemoryDatabase::new();
        db.upsert(p1_first_visit()).await.unwrap();
        db.upsert(PlaceUpsert {
            place_id: "p2".to_string(),
            name: Some("Momo Hut".to_string()),
            rating: Some(3.9),
            is_open: Some(false),
            ..Default::default()
        })
        .await
        .unwrap();

        let all = db.list(&PlaceFilter::default()).await.unwrap();
        assert_eq!(
            all.iter().map(|p| p.place_id.as_str()).collect::<Vec<_>>(),
            vec!["p1", "p2"]
        );

        let good = db
            .list(&PlaceFilter {
                min_rating: Some(4.0),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(good.len(), 1);
        assert_eq!(good[0].place_id, "p1");

        let momo = db
            .list(&PlaceFilter {
                search: Some("momo".to_string()),
                open_now: Some(false),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(momo.len(), 1);
        assert_eq!(momo[0].place_id, "p2");
    }

    #[tokio::test]
    async fn test_missing_place() {
        let db = InMemoryDatabase::new();
        assert!(db.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_areas_newest_first() {
        let db = InMemoryDatabase::new();
        let first = db.create_area(NewArea::new(27.7, 85.3, 500.0)).await.unwrap();
        let second = db.create_area(NewArea::new(27.8, 85.4, 1500.0)).await.unwrap();

        let areas = db.list_areas().await.unwrap();
        assert_eq!(areas.len(), 2);
        assert_eq!(areas[0].id, second.id);
        assert_eq!(areas[1].id, first.id);

        assert_eq!(db.get_area(first.id).await.unwrap(), Some(first.clone()));
        assert!(db.get_area(Uuid::now_v7()).await.unwrap().is_none());

        assert!(db.delete_area(first.id).await.unwrap());
        assert!(!db.delete_area(first.id).await.unwrap());
        assert_eq!(db.list_areas().await.unwrap(), vec![second]);
    }
}
