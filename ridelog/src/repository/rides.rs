use std::sync::Arc;

use futures::{Stream, StreamExt};
use log::{debug, info};
use uuid::Uuid;

use super::{LiveStream, mapping};
use crate::config::SettingsStore;
use crate::database::Database;
use crate::error::Result;
use crate::persistence::RideEntity;
use crate::types::Ride;

/// Live list of rides, most recent first.
pub type RideStream = LiveStream<RideEntity, Ride>;

#[derive(Clone)]
pub struct RidesRepository {
    database: Arc<Database>,
    settings: Arc<SettingsStore>,
}

impl RidesRepository {
    pub fn new(database: Arc<Database>, settings: Arc<SettingsStore>) -> Self {
        Self { database, settings }
    }

    /// Start broadcasting ride changes. Idempotent.
    pub fn setup(&self) {
        if self.database.attach(self.database.ride_broadcaster()) {
            info!("[RidesRepository] Observing ride changes");
        }
    }

    /// Every ride, re-emitted after each committed change to bikes or rides.
    pub fn observe_all(&self) -> RideStream {
        let subscription = self.database.subscribe(self.database.ride_broadcaster());
        debug!("[RidesRepository] Observer {} attached", subscription.id());
        LiveStream::new(
            subscription,
            Arc::clone(&self.settings),
            mapping::ride_to_domain,
        )
    }

    /// Rides of a single bike, filtered from the live ride list.
    pub fn observe_for_bike(
        &self,
        bike_id: Uuid,
    ) -> impl Stream<Item = Vec<Ride>> + Send + Unpin + use<> {
        self.observe_all().map(move |rides| {
            rides
                .into_iter()
                .filter(|ride| ride.bike_id == bike_id)
                .collect()
        })
    }

    pub async fn get_one(&self, id: Uuid) -> Result<Ride> {
        let entity = self
            .database
            .with_store(|store| store.fetch_ride(&id.to_string()))?;
        mapping::ride_to_domain(&entity, self.settings.distance_unit())
    }

    /// One-off read of every ride, most recent first.
    pub async fn get_all(&self) -> Result<Vec<Ride>> {
        let entities = self.database.with_store(|store| store.fetch_all_rides())?;
        Ok(mapping::map_snapshot(
            &entities,
            self.settings.distance_unit(),
            mapping::ride_to_domain,
        ))
    }

    /// Insert a new ride. Fails with `ParentNotFound` if its bike is missing.
    pub async fn add(&self, ride: &Ride) -> Result<()> {
        let entity = mapping::ride_to_entity(ride, self.settings.distance_unit());
        self.database.with_store(|store| store.add_ride(&entity))?;
        debug!("[RidesRepository] Added {} to bike {}", ride.id, ride.bike_id);
        Ok(())
    }

    /// Replace every mutable field of an existing ride, including its bike.
    pub async fn update(&self, ride: &Ride) -> Result<()> {
        let entity = mapping::ride_to_entity(ride, self.settings.distance_unit());
        self.database.with_store(|store| store.update_ride(&entity))?;
        debug!("[RidesRepository] Updated {}", ride.id);
        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        self.database
            .with_store(|store| store.delete_ride(&id.to_string()))?;
        debug!("[RidesRepository] Deleted {}", id);
        Ok(())
    }
}
