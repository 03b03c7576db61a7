//! Serialized owner of the record store.
//!
//! Every store access goes through one mutex. Mutations notify listeners while
//! the lock is still held, so mutate, re-fetch and broadcast form a single
//! critical section: no subscriber can see a snapshot mixing pre- and
//! post-mutation state, and racing writers are applied one after the other.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{info, warn};

use crate::broadcast::{Broadcaster, SnapshotQuery, Subscription};
use crate::error::Result;
use crate::persistence::{BikeEntity, RecordStore, RideEntity, StoreStats};

pub struct Database {
    store: Mutex<RecordStore>,
    bikes: Arc<Broadcaster<BikeEntity>>,
    rides: Arc<Broadcaster<RideEntity>>,
}

impl Database {
    /// Open (or create) the SQLite database at `db_path`.
    pub fn open(db_path: &str) -> Result<Self> {
        Ok(Self::with_record_store(RecordStore::open(db_path)?))
    }

    /// In-memory database (tests, previews).
    pub fn in_memory() -> Result<Self> {
        Ok(Self::with_record_store(RecordStore::in_memory()?))
    }

    fn with_record_store(store: RecordStore) -> Self {
        Self {
            store: Mutex::new(store),
            bikes: Arc::new(Broadcaster::new()),
            rides: Arc::new(Broadcaster::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RecordStore> {
        // A panic mid-operation leaves SQLite consistent (the open transaction
        // rolls back on drop), so a poisoned guard is still usable.
        self.store.lock().unwrap_or_else(|poisoned| {
            warn!("[Database] Store lock was poisoned, recovering");
            PoisonError::into_inner(poisoned)
        })
    }

    /// Run `f` with exclusive access to the store.
    pub fn with_store<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut RecordStore) -> Result<R>,
    {
        let mut store = self.lock();
        f(&mut store)
    }

    pub fn bike_broadcaster(&self) -> &Arc<Broadcaster<BikeEntity>> {
        &self.bikes
    }

    pub fn ride_broadcaster(&self) -> &Arc<Broadcaster<RideEntity>> {
        &self.rides
    }

    /// Attach `broadcaster` as a change listener. Returns false if a
    /// broadcaster for this record kind was already attached.
    pub fn attach<E: SnapshotQuery>(&self, broadcaster: &Arc<Broadcaster<E>>) -> bool {
        let mut store = self.lock();
        let attached = store.add_listener(E::KEY, broadcaster.clone());
        if attached {
            info!("[Database] Live updates enabled for {}", E::KEY);
        }
        attached
    }

    pub fn is_attached<E: SnapshotQuery>(&self) -> bool {
        self.lock().has_listener(E::KEY)
    }

    /// Register a subscriber on `broadcaster` atomically with its initial read.
    pub fn subscribe<E: SnapshotQuery>(&self, broadcaster: &Broadcaster<E>) -> Subscription<E> {
        let store = self.lock();
        broadcaster.subscribe(&store)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        self.lock().stats()
    }
}
