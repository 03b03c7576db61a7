//! # Repository Facade
//!
//! The interface the UI layer talks to. Operations are async and run against
//! the shared [`Database`]; none of them hold the store lock across an await.
//!
//! The futures never yield. Each one runs a single short SQLite statement or
//! transaction synchronously on the polling thread, behind the store mutex, so
//! it completes on any executor without a runtime. Callers polling from a
//! latency-sensitive async worker should move bulk work to
//! `tokio::task::spawn_blocking`.
//!
//! Distances are converted between kilometers and the display unit currently
//! configured in [`SettingsStore`].
//!
//! Live observation hands out [`LiveStream`]s: every item is the complete,
//! current list of domain values. Records that fail mapping are dropped from
//! the item with a warning; errors never travel over a stream.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use log::info;

use crate::broadcast::Subscription;
use crate::config::SettingsStore;
use crate::database::Database;
use crate::error::Result;
use crate::units::DistanceUnit;

pub mod bikes;
pub(crate) mod mapping;
pub mod rides;

pub use bikes::{BikeStream, BikesRepository};
pub use rides::{RideStream, RidesRepository};

/// Stream of full domain snapshots.
///
/// Entities are mapped when the item is polled, using the display unit
/// configured at that moment. Snapshots queued before a unit change therefore
/// come out in the unit in effect when they are polled, not the one in effect
/// when they were published.
pub struct LiveStream<E, T> {
    subscription: Subscription<E>,
    settings: Arc<SettingsStore>,
    map: fn(&E, DistanceUnit) -> Result<T>,
}

impl<E, T> LiveStream<E, T> {
    pub(crate) fn new(
        subscription: Subscription<E>,
        settings: Arc<SettingsStore>,
        map: fn(&E, DistanceUnit) -> Result<T>,
    ) -> Self {
        Self {
            subscription,
            settings,
            map,
        }
    }

    /// Registry id of the underlying subscription.
    pub fn subscriber_id(&self) -> u64 {
        self.subscription.id()
    }
}

impl<E, T> Stream for LiveStream<E, T> {
    type Item = Vec<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        this.subscription.poll_next_unpin(cx).map(|snapshot| {
            snapshot.map(|entities| {
                mapping::map_snapshot(&entities, this.settings.distance_unit(), this.map)
            })
        })
    }
}

/// Both repositories over one database and one settings store.
#[derive(Clone)]
pub struct Repositories {
    pub database: Arc<Database>,
    pub settings: Arc<SettingsStore>,
    pub bikes: BikesRepository,
    pub rides: RidesRepository,
}

impl Repositories {
    pub fn new(database: Arc<Database>, settings: Arc<SettingsStore>) -> Self {
        Self {
            bikes: BikesRepository::new(Arc::clone(&database), Arc::clone(&settings)),
            rides: RidesRepository::new(Arc::clone(&database), Arc::clone(&settings)),
            database,
            settings,
        }
    }

    /// In-memory database with default settings.
    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(
            Arc::new(Database::in_memory()?),
            Arc::new(SettingsStore::default()),
        ))
    }

    /// Enable live updates for both record kinds. Safe to call repeatedly.
    pub fn setup(&self) {
        self.bikes.setup();
        self.rides.setup();
        info!("[Repositories] Ready");
    }
}
