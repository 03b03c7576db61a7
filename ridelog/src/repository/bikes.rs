use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info};
use uuid::Uuid;

use super::{LiveStream, mapping};
use crate::config::SettingsStore;
use crate::database::Database;
use crate::error::Result;
use crate::persistence::BikeEntity;
use crate::types::Bike;

/// Live list of bikes, default bike first.
pub type BikeStream = LiveStream<BikeEntity, Bike>;

#[derive(Clone)]
pub struct BikesRepository {
    database: Arc<Database>,
    settings: Arc<SettingsStore>,
}

impl BikesRepository {
    pub fn new(database: Arc<Database>, settings: Arc<SettingsStore>) -> Self {
        Self { database, settings }
    }

    /// Start broadcasting bike changes. Idempotent.
    pub fn setup(&self) {
        if self.database.attach(self.database.bike_broadcaster()) {
            info!("[BikesRepository] Observing bike changes");
        }
    }

    /// Every bike with its rides, re-emitted after each committed change.
    ///
    /// Without [`BikesRepository::setup`] the stream yields only the initial
    /// snapshot.
    pub fn observe_all(&self) -> BikeStream {
        let subscription = self.database.subscribe(self.database.bike_broadcaster());
        debug!("[BikesRepository] Observer {} attached", subscription.id());
        LiveStream::new(
            subscription,
            Arc::clone(&self.settings),
            mapping::bike_to_domain,
        )
    }

    pub async fn get_one(&self, id: Uuid) -> Result<Bike> {
        let entity = self
            .database
            .with_store(|store| store.fetch_bike(&id.to_string()))?;
        mapping::bike_to_domain(&entity, self.settings.distance_unit())
    }

    /// One-off read of every bike. Unmappable bikes are skipped, as on the
    /// live stream.
    pub async fn get_all(&self) -> Result<Vec<Bike>> {
        let entities = self.database.with_store(|store| store.fetch_all_bikes())?;
        Ok(mapping::map_snapshot(
            &entities,
            self.settings.distance_unit(),
            mapping::bike_to_domain,
        ))
    }

    /// The bike flagged as default, if any.
    pub async fn default_bike(&self) -> Result<Option<Bike>> {
        let entities = self.database.with_store(|store| store.fetch_all_bikes())?;
        let unit = self.settings.distance_unit();
        entities
            .iter()
            .find(|b| b.is_default)
            .map(|b| mapping::bike_to_domain(b, unit))
            .transpose()
    }

    /// Insert a new bike. Its rides are ignored; add them through the rides
    /// repository.
    pub async fn add(&self, bike: &Bike) -> Result<()> {
        let entity = mapping::bike_to_entity(bike, self.settings.distance_unit());
        self.database.with_store(|store| store.add_bike(&entity))?;
        debug!("[BikesRepository] Added {} ({})", bike.name, bike.id);
        Ok(())
    }

    /// Replace every mutable field of an existing bike.
    pub async fn update(&self, bike: &Bike) -> Result<()> {
        let entity = mapping::bike_to_entity(bike, self.settings.distance_unit());
        self.database.with_store(|store| store.update_bike(&entity))?;
        debug!("[BikesRepository] Updated {}", bike.id);
        Ok(())
    }

    /// Delete a bike together with all of its rides.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        self.database
            .with_store(|store| store.delete_bike(&id.to_string()))?;
        debug!("[BikesRepository] Deleted {}", id);
        Ok(())
    }

    pub async fn set_default(&self, id: Uuid) -> Result<()> {
        self.database
            .with_store(|store| store.set_default_bike(&id.to_string()))?;
        info!("[BikesRepository] Default bike is now {}", id);
        Ok(())
    }

    /// Record the date of the most recent maintenance.
    pub async fn set_latest_service(&self, id: Uuid, date: DateTime<Utc>) -> Result<()> {
        self.database
            .with_store(|store| store.set_latest_service(&id.to_string(), date.timestamp()))?;
        debug!("[BikesRepository] Serviced {} on {}", id, date);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RecordKind, StoreError};
    use crate::types::{BikeType, Ride, WheelSize};
    use crate::units::DistanceUnit;
    use chrono::TimeZone;
    use futures::executor::block_on;
    use futures::{FutureExt, StreamExt};

    fn repo() -> BikesRepository {
        BikesRepository::new(
            Arc::new(Database::in_memory().unwrap()),
            Arc::new(SettingsStore::default()),
        )
    }

    fn mtb() -> Bike {
        Bike::new(BikeType::Mountain, "MTB", "bikeOrange", WheelSize::Small, 100.0)
    }

    fn ride_on(bike: &Bike, distance: f64) -> Ride {
        let date = Utc.with_ymd_and_hms(2024, 5, 4, 8, 30, 0).unwrap();
        Ride::new("Trail", distance, 90, date, bike)
    }

    #[tokio::test]
    async fn test_add_and_get_one() {
        let repo = repo();
        let bike = mtb().with_default(true);
        repo.add(&bike).await.unwrap();

        let fetched = repo.get_one(bike.id).await.unwrap();
        assert_eq!(fetched, bike);
    }

    #[tokio::test]
    async fn test_get_one_missing_is_not_found() {
        let repo = repo();
        let id = Uuid::now_v7();
        assert_eq!(
            repo.get_one(id).await.unwrap_err(),
            StoreError::not_found(RecordKind::Bike, id)
        );
    }

    #[tokio::test]
    async fn test_overdue_service_from_stored_rides() {
        let repo = repo();
        let bike = mtb();
        repo.add(&bike).await.unwrap();
        repo.database
            .with_store(|store| {
                for distance in [45.0, 65.0] {
                    store.add_ride(&mapping::ride_to_entity(
                        &ride_on(&bike, distance),
                        DistanceUnit::Km,
                    ))?;
                }
                Ok(())
            })
            .unwrap();

        let fetched = repo.get_one(bike.id).await.unwrap();
        assert_eq!(fetched.rides_total_distance(), 110.0);
        assert_eq!(fetched.formatted_service_due(), "Overdue");
    }

    #[tokio::test]
    async fn test_set_default_moves_flag() {
        let repo = repo();
        let a = mtb();
        let b = mtb();
        repo.add(&a).await.unwrap();
        repo.add(&b).await.unwrap();

        repo.set_default(a.id).await.unwrap();
        repo.set_default(b.id).await.unwrap();

        assert!(!repo.get_one(a.id).await.unwrap().is_default);
        assert_eq!(repo.default_bike().await.unwrap().map(|d| d.id), Some(b.id));
    }

    #[tokio::test]
    async fn test_set_latest_service() {
        let repo = repo();
        let bike = mtb();
        repo.add(&bike).await.unwrap();

        let serviced = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        repo.set_latest_service(bike.id, serviced).await.unwrap();

        assert_eq!(
            repo.get_one(bike.id).await.unwrap().latest_service,
            Some(serviced)
        );
    }

    #[tokio::test]
    async fn test_service_due_stored_in_km() {
        let repo = repo();
        repo.settings.set_distance_unit(DistanceUnit::Mi).unwrap();
        let bike = mtb();
        repo.add(&bike).await.unwrap();

        let stored = repo
            .database
            .with_store(|store| store.fetch_bike(&bike.id.to_string()))
            .unwrap();
        assert!((stored.service_due_km - 160.9344).abs() < 1e-9);

        repo.settings.set_distance_unit(DistanceUnit::Km).unwrap();
        let in_km = repo.get_one(bike.id).await.unwrap();
        assert!((in_km.service_due - 160.9344).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_stream_skips_unmappable_bike() {
        let repo = repo();
        repo.setup();
        let good = mtb();
        repo.add(&good).await.unwrap();
        repo.database
            .with_store(|store| {
                store
                    .connection()
                    .execute(
                        "INSERT INTO bikes (id, bike_type, name, color, wheel_size, service_due_km)
                         VALUES ('broken', 42, 'Broken', 'bikeRed', 1, 10.0)",
                        [],
                    )
                    .map_err(StoreError::from)
            })
            .unwrap();

        let mut stream = repo.observe_all();
        let bikes = stream.next().await.unwrap();
        assert_eq!(bikes.len(), 1);
        assert_eq!(bikes[0].id, good.id);
        assert!(stream.next().now_or_never().is_none());

        assert!(matches!(
            repo.database
                .with_store(|store| store.fetch_bike("broken"))
                .and_then(|e| mapping::bike_to_domain(&e, DistanceUnit::Km)),
            Err(StoreError::MappingFailed { .. })
        ));
    }

    #[test]
    fn test_operations_complete_without_runtime() {
        let repo = repo();
        let bike = mtb();

        block_on(repo.add(&bike)).unwrap();
        block_on(repo.set_default(bike.id)).unwrap();
        let fetched = block_on(repo.get_one(bike.id)).unwrap();
        assert!(fetched.is_default);

        // Each future is ready on its first poll
        assert_eq!(repo.get_all().now_or_never().unwrap().unwrap().len(), 1);
        assert!(repo.delete(bike.id).now_or_never().unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_update_missing_bike_is_not_found() {
        let repo = repo();
        assert!(repo.update(&mtb()).await.unwrap_err().is_not_found());
        assert!(repo.delete(Uuid::now_v7()).await.unwrap_err().is_not_found());
    }
}
