//! # Record Store
//!
//! SQLite storage for bikes and rides.
//!
//! All distances are stored in kilometers and all timestamps as Unix seconds.
//! Entities here are raw rows: enum fields keep their stored integer value so a
//! row with an unknown raw value can still be read and reported as a mapping
//! failure by the repository layer.
//!
//! Every mutation runs in a single transaction. After a successful commit the
//! store emits a [`StoreChange`] to every registered [`ChangeListener`],
//! synchronously and with the store still borrowed, so listeners observe the
//! post-commit state and nothing else can interleave.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::error::{OptionExt, RecordKind, Result, StoreError};
use crate::migrations;

// ============================================================================
// Entities
// ============================================================================

/// Stored bike row plus its rides (ordered by date, most recent first).
#[derive(Debug, Clone, PartialEq)]
pub struct BikeEntity {
    pub id: String,
    /// Raw `BikeType` value
    pub bike_type: i64,
    pub name: String,
    pub color: String,
    /// Raw `WheelSize` value
    pub wheel_size: i64,
    pub service_due_km: f64,
    pub is_default: bool,
    /// Unix timestamp (seconds)
    pub latest_service: Option<i64>,
    /// Populated on reads, ignored on writes
    pub rides: Vec<RideEntity>,
}

/// Stored ride row joined with the owning bike's name and type.
#[derive(Debug, Clone, PartialEq)]
pub struct RideEntity {
    pub id: String,
    pub bike_id: String,
    /// Populated on reads, ignored on writes
    pub bike_name: String,
    /// Populated on reads, ignored on writes
    pub bike_type: i64,
    pub name: String,
    pub distance_km: f64,
    pub duration_minutes: i64,
    /// Unix timestamp (seconds)
    pub date: i64,
}

/// Counts for diagnostics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreStats {
    pub bike_count: u32,
    pub ride_count: u32,
    pub default_bike_id: Option<String>,
}

// ============================================================================
// Change signal
// ============================================================================

/// What a committed mutation touched.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreChange {
    Inserted { kind: RecordKind, id: String },
    Updated { kind: RecordKind, id: String },
    Deleted { kind: RecordKind, id: String },
    Cleared,
}

/// Observer of committed store mutations.
///
/// Called with the store after commit. Implementations must not panic and
/// should treat read failures as non-fatal.
pub trait ChangeListener: Send + Sync {
    fn on_change(&self, store: &RecordStore, change: &StoreChange);
}

// ============================================================================
// Record Store
// ============================================================================

const BIKE_COLUMNS: &str =
    "id, bike_type, name, color, wheel_size, service_due_km, is_default, latest_service";

const RIDE_SELECT: &str = "SELECT r.id, r.bike_id, b.name, b.bike_type, r.name, r.distance_km,
                                  r.duration_minutes, r.date
                           FROM rides r JOIN bikes b ON b.id = r.bike_id";

pub struct RecordStore {
    db: Connection,

    /// Registered change listeners, keyed so registration is idempotent
    listeners: Vec<(&'static str, Arc<dyn ChangeListener>)>,
}

impl RecordStore {
    // ========================================================================
    // Initialization
    // ========================================================================

    /// Open (or create) the database at `db_path` and migrate it.
    pub fn open(db_path: &str) -> Result<Self> {
        info!("[RecordStore] Opening database at {}", db_path);
        let db = Connection::open(db_path)?;
        if db_path != ":memory:" {
            let mode: String = db.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
            debug!("[RecordStore] journal_mode = {}", mode);
        }
        Self::from_connection(db)
    }

    /// In-memory database (tests, previews).
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut db: Connection) -> Result<Self> {
        db.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrations::migrate_to_latest(&mut db)?;
        Ok(Self {
            db,
            listeners: Vec::new(),
        })
    }

    /// Register a change listener under `key`. Returns false if `key` is
    /// already registered.
    pub fn add_listener(&mut self, key: &'static str, listener: Arc<dyn ChangeListener>) -> bool {
        if self.listeners.iter().any(|(k, _)| *k == key) {
            return false;
        }
        info!("[RecordStore] Listener '{}' attached", key);
        self.listeners.push((key, listener));
        true
    }

    pub fn has_listener(&self, key: &str) -> bool {
        self.listeners.iter().any(|(k, _)| *k == key)
    }

    fn notify(&self, change: StoreChange) {
        debug!("[RecordStore] Committed {:?}", change);
        for (_, listener) in &self.listeners {
            listener.on_change(self, &change);
        }
    }

    // ========================================================================
    // Bikes
    // ========================================================================

    pub fn add_bike(&mut self, bike: &BikeEntity) -> Result<()> {
        let tx = self.db.transaction()?;
        if bike.is_default {
            tx.execute("UPDATE bikes SET is_default = 0 WHERE is_default = 1", [])?;
        }
        tx.execute(
            "INSERT INTO bikes (id, bike_type, name, color, wheel_size, service_due_km,
                                is_default, latest_service)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                bike.id,
                bike.bike_type,
                bike.name,
                bike.color,
                bike.wheel_size,
                bike.service_due_km,
                bike.is_default,
                bike.latest_service,
            ],
        )?;
        tx.commit()?;

        self.notify(StoreChange::Inserted {
            kind: RecordKind::Bike,
            id: bike.id.clone(),
        });
        Ok(())
    }

    /// Replace every mutable field of an existing bike.
    pub fn update_bike(&mut self, bike: &BikeEntity) -> Result<()> {
        let tx = self.db.transaction()?;
        if bike.is_default {
            tx.execute(
                "UPDATE bikes SET is_default = 0 WHERE is_default = 1 AND id != ?1",
                params![bike.id],
            )?;
        }
        let updated = tx.execute(
            "UPDATE bikes SET bike_type = ?2, name = ?3, color = ?4, wheel_size = ?5,
                              service_due_km = ?6, is_default = ?7, latest_service = ?8
             WHERE id = ?1",
            params![
                bike.id,
                bike.bike_type,
                bike.name,
                bike.color,
                bike.wheel_size,
                bike.service_due_km,
                bike.is_default,
                bike.latest_service,
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::not_found(RecordKind::Bike, &bike.id));
        }
        tx.commit()?;

        self.notify(StoreChange::Updated {
            kind: RecordKind::Bike,
            id: bike.id.clone(),
        });
        Ok(())
    }

    /// Delete a bike and all of its rides in one transaction.
    pub fn delete_bike(&mut self, id: &str) -> Result<()> {
        let tx = self.db.transaction()?;
        let rides = tx.execute("DELETE FROM rides WHERE bike_id = ?1", params![id])?;
        let deleted = tx.execute("DELETE FROM bikes WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(StoreError::not_found(RecordKind::Bike, id));
        }
        tx.commit()?;

        debug!("[RecordStore] Bike {} deleted with {} rides", id, rides);
        self.notify(StoreChange::Deleted {
            kind: RecordKind::Bike,
            id: id.to_string(),
        });
        Ok(())
    }

    /// Mark one bike as default and clear the flag everywhere else.
    ///
    /// Only the previous default and the target row are written.
    pub fn set_default_bike(&mut self, id: &str) -> Result<()> {
        let tx = self.db.transaction()?;
        let exists = tx
            .query_row("SELECT 1 FROM bikes WHERE id = ?1", params![id], |_| Ok(()))
            .optional()?;
        if exists.is_none() {
            return Err(StoreError::not_found(RecordKind::Bike, id));
        }
        tx.execute(
            "UPDATE bikes SET is_default = 0 WHERE is_default = 1 AND id != ?1",
            params![id],
        )?;
        tx.execute("UPDATE bikes SET is_default = 1 WHERE id = ?1", params![id])?;
        tx.commit()?;

        self.notify(StoreChange::Updated {
            kind: RecordKind::Bike,
            id: id.to_string(),
        });
        Ok(())
    }

    /// Update only the maintenance timestamp of a bike.
    pub fn set_latest_service(&mut self, id: &str, timestamp: i64) -> Result<()> {
        let updated = self.db.execute(
            "UPDATE bikes SET latest_service = ?2 WHERE id = ?1",
            params![id, timestamp],
        )?;
        if updated == 0 {
            return Err(StoreError::not_found(RecordKind::Bike, id));
        }

        self.notify(StoreChange::Updated {
            kind: RecordKind::Bike,
            id: id.to_string(),
        });
        Ok(())
    }

    pub fn fetch_bike(&self, id: &str) -> Result<BikeEntity> {
        let sql = format!("SELECT {} FROM bikes WHERE id = ?1", BIKE_COLUMNS);
        let mut bike = self
            .db
            .query_row(&sql, params![id], bike_from_row)
            .optional()?
            .ok_or_not_found(RecordKind::Bike, id)?;
        bike.rides = self.fetch_rides_for_bike(id)?;
        Ok(bike)
    }

    /// All bikes, default bike first, then in insertion order. Each bike
    /// carries its rides.
    pub fn fetch_all_bikes(&self) -> Result<Vec<BikeEntity>> {
        let sql = format!(
            "SELECT {} FROM bikes ORDER BY is_default DESC, created_at ASC, rowid ASC",
            BIKE_COLUMNS
        );
        let mut stmt = self.db.prepare(&sql)?;
        let mut bikes = stmt
            .query_map([], bike_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut rides_by_bike: HashMap<String, Vec<RideEntity>> = HashMap::new();
        for ride in self.fetch_all_rides()? {
            rides_by_bike
                .entry(ride.bike_id.clone())
                .or_default()
                .push(ride);
        }
        for bike in &mut bikes {
            bike.rides = rides_by_bike.remove(&bike.id).unwrap_or_default();
        }

        Ok(bikes)
    }

    pub fn has_bike(&self, id: &str) -> Result<bool> {
        let found = self
            .db
            .query_row("SELECT 1 FROM bikes WHERE id = ?1", params![id], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    // ========================================================================
    // Rides
    // ========================================================================

    pub fn add_ride(&mut self, ride: &RideEntity) -> Result<()> {
        let tx = self.db.transaction()?;
        ensure_parent(&tx, &ride.bike_id)?;
        tx.execute(
            "INSERT INTO rides (id, bike_id, name, distance_km, duration_minutes, date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                ride.id,
                ride.bike_id,
                ride.name,
                ride.distance_km,
                ride.duration_minutes,
                ride.date,
            ],
        )?;
        tx.commit()?;

        self.notify(StoreChange::Inserted {
            kind: RecordKind::Ride,
            id: ride.id.clone(),
        });
        Ok(())
    }

    /// Replace every mutable field of an existing ride, including its parent.
    pub fn update_ride(&mut self, ride: &RideEntity) -> Result<()> {
        let tx = self.db.transaction()?;
        let exists = tx
            .query_row("SELECT 1 FROM rides WHERE id = ?1", params![ride.id], |_| {
                Ok(())
            })
            .optional()?;
        if exists.is_none() {
            return Err(StoreError::not_found(RecordKind::Ride, &ride.id));
        }
        ensure_parent(&tx, &ride.bike_id)?;
        tx.execute(
            "UPDATE rides SET bike_id = ?2, name = ?3, distance_km = ?4,
                              duration_minutes = ?5, date = ?6
             WHERE id = ?1",
            params![
                ride.id,
                ride.bike_id,
                ride.name,
                ride.distance_km,
                ride.duration_minutes,
                ride.date,
            ],
        )?;
        tx.commit()?;

        self.notify(StoreChange::Updated {
            kind: RecordKind::Ride,
            id: ride.id.clone(),
        });
        Ok(())
    }

    pub fn delete_ride(&mut self, id: &str) -> Result<()> {
        let deleted = self
            .db
            .execute("DELETE FROM rides WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(StoreError::not_found(RecordKind::Ride, id));
        }

        self.notify(StoreChange::Deleted {
            kind: RecordKind::Ride,
            id: id.to_string(),
        });
        Ok(())
    }

    pub fn fetch_ride(&self, id: &str) -> Result<RideEntity> {
        let sql = format!("{} WHERE r.id = ?1", RIDE_SELECT);
        self.db
            .query_row(&sql, params![id], ride_from_row)
            .optional()?
            .ok_or_not_found(RecordKind::Ride, id)
    }

    /// All rides, most recent first.
    pub fn fetch_all_rides(&self) -> Result<Vec<RideEntity>> {
        let sql = format!("{} ORDER BY r.date DESC, r.rowid ASC", RIDE_SELECT);
        let mut stmt = self.db.prepare(&sql)?;
        let rides = stmt
            .query_map([], ride_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rides)
    }

    /// Rides of one bike, most recent first.
    pub fn fetch_rides_for_bike(&self, bike_id: &str) -> Result<Vec<RideEntity>> {
        let sql = format!(
            "{} WHERE r.bike_id = ?1 ORDER BY r.date DESC, r.rowid ASC",
            RIDE_SELECT
        );
        let mut stmt = self.db.prepare(&sql)?;
        let rides = stmt
            .query_map(params![bike_id], ride_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rides)
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    pub fn bike_count(&self) -> Result<u32> {
        let count: i64 = self
            .db
            .query_row("SELECT COUNT(*) FROM bikes", [], |row| row.get(0))?;
        Ok(count as u32)
    }

    pub fn ride_count(&self) -> Result<u32> {
        let count: i64 = self
            .db
            .query_row("SELECT COUNT(*) FROM rides", [], |row| row.get(0))?;
        Ok(count as u32)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let default_bike_id = self
            .db
            .query_row("SELECT id FROM bikes WHERE is_default = 1", [], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(StoreStats {
            bike_count: self.bike_count()?,
            ride_count: self.ride_count()?,
            default_bike_id,
        })
    }

    /// Delete every bike and ride.
    pub fn clear(&mut self) -> Result<()> {
        let tx = self.db.transaction()?;
        tx.execute_batch("DELETE FROM rides; DELETE FROM bikes;")?;
        tx.commit()?;

        info!("[RecordStore] Cleared");
        self.notify(StoreChange::Cleared);
        Ok(())
    }

    /// Raw connection access for tests that need to plant malformed rows.
    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.db
    }
}

// ============================================================================
// Row helpers
// ============================================================================

fn ensure_parent(conn: &Connection, bike_id: &str) -> Result<()> {
    let parent = conn
        .query_row("SELECT 1 FROM bikes WHERE id = ?1", params![bike_id], |_| {
            Ok(())
        })
        .optional()?;
    if parent.is_none() {
        return Err(StoreError::ParentNotFound {
            bike_id: bike_id.to_string(),
        });
    }
    Ok(())
}

fn bike_from_row(row: &Row<'_>) -> rusqlite::Result<BikeEntity> {
    Ok(BikeEntity {
        id: row.get(0)?,
        bike_type: row.get(1)?,
        name: row.get(2)?,
        color: row.get(3)?,
        wheel_size: row.get(4)?,
        service_due_km: row.get(5)?,
        is_default: row.get(6)?,
        latest_service: row.get(7)?,
        rides: Vec::new(),
    })
}

fn ride_from_row(row: &Row<'_>) -> rusqlite::Result<RideEntity> {
    Ok(RideEntity {
        id: row.get(0)?,
        bike_id: row.get(1)?,
        bike_name: row.get(2)?,
        bike_type: row.get(3)?,
        name: row.get(4)?,
        distance_km: row.get(5)?,
        duration_minutes: row.get(6)?,
        date: row.get(7)?,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn bike(id: &str, is_default: bool) -> BikeEntity {
        BikeEntity {
            id: id.to_string(),
            bike_type: 1,
            name: format!("Bike {}", id),
            color: "bikeOrange".to_string(),
            wheel_size: 2,
            service_due_km: 100.0,
            is_default,
            latest_service: None,
            rides: Vec::new(),
        }
    }

    fn ride(id: &str, bike_id: &str, distance_km: f64, date: i64) -> RideEntity {
        RideEntity {
            id: id.to_string(),
            bike_id: bike_id.to_string(),
            bike_name: String::new(),
            bike_type: 0,
            name: format!("Ride {}", id),
            distance_km,
            duration_minutes: 60,
            date,
        }
    }

    #[derive(Default)]
    struct Recorder {
        changes: Mutex<Vec<StoreChange>>,
    }

    impl ChangeListener for Recorder {
        fn on_change(&self, _store: &RecordStore, change: &StoreChange) {
            self.changes.lock().unwrap().push(change.clone());
        }
    }

    #[test]
    fn test_create_store() {
        let store = RecordStore::in_memory().unwrap();
        assert_eq!(store.bike_count().unwrap(), 0);
        assert_eq!(store.ride_count().unwrap(), 0);
    }

    #[test]
    fn test_add_and_fetch_bike() {
        let mut store = RecordStore::in_memory().unwrap();
        store.add_bike(&bike("b1", false)).unwrap();

        let fetched = store.fetch_bike("b1").unwrap();
        assert_eq!(fetched, bike("b1", false));
        assert!(store.has_bike("b1").unwrap());
        assert!(!store.has_bike("b2").unwrap());
    }

    #[test]
    fn test_duplicate_bike_id_fails_write() {
        let mut store = RecordStore::in_memory().unwrap();
        store.add_bike(&bike("b1", false)).unwrap();
        let err = store.add_bike(&bike("b1", false)).unwrap_err();
        assert!(matches!(err, StoreError::WriteFailed { .. }));
        assert_eq!(store.bike_count().unwrap(), 1);
    }

    #[test]
    fn test_fetch_missing_bike() {
        let store = RecordStore::in_memory().unwrap();
        assert!(store.fetch_bike("nope").unwrap_err().is_not_found());
    }

    #[test]
    fn test_default_bike_sorted_first() {
        let mut store = RecordStore::in_memory().unwrap();
        store.add_bike(&bike("b1", false)).unwrap();
        store.add_bike(&bike("b2", false)).unwrap();
        store.add_bike(&bike("b3", true)).unwrap();

        let ids: Vec<String> = store
            .fetch_all_bikes()
            .unwrap()
            .into_iter()
            .map(|b| b.id)
            .collect();
        assert_eq!(ids, vec!["b3", "b1", "b2"]);
    }

    #[test]
    fn test_adding_default_bike_clears_previous_default() {
        let mut store = RecordStore::in_memory().unwrap();
        store.add_bike(&bike("b1", true)).unwrap();
        store.add_bike(&bike("b2", true)).unwrap();

        let defaults: Vec<String> = store
            .fetch_all_bikes()
            .unwrap()
            .into_iter()
            .filter(|b| b.is_default)
            .map(|b| b.id)
            .collect();
        assert_eq!(defaults, vec!["b2"]);
    }

    #[test]
    fn test_set_default_bike() {
        let mut store = RecordStore::in_memory().unwrap();
        store.add_bike(&bike("a", false)).unwrap();
        store.add_bike(&bike("b", false)).unwrap();

        store.set_default_bike("a").unwrap();
        store.set_default_bike("b").unwrap();

        assert!(!store.fetch_bike("a").unwrap().is_default);
        assert!(store.fetch_bike("b").unwrap().is_default);
        assert_eq!(store.stats().unwrap().default_bike_id.as_deref(), Some("b"));

        // Re-marking the current default is fine
        store.set_default_bike("b").unwrap();
        assert!(store.fetch_bike("b").unwrap().is_default);
    }

    #[test]
    fn test_set_default_missing_bike_keeps_current_default() {
        let mut store = RecordStore::in_memory().unwrap();
        store.add_bike(&bike("a", true)).unwrap();

        assert!(store.set_default_bike("ghost").unwrap_err().is_not_found());
        assert!(store.fetch_bike("a").unwrap().is_default);
    }

    #[test]
    fn test_update_non_default_bike_keeps_other_default() {
        let mut store = RecordStore::in_memory().unwrap();
        store.add_bike(&bike("a", true)).unwrap();
        store.add_bike(&bike("b", false)).unwrap();

        let mut b = bike("b", false);
        b.name = "Renamed".to_string();
        store.update_bike(&b).unwrap();

        assert!(store.fetch_bike("a").unwrap().is_default);
        assert_eq!(store.fetch_bike("b").unwrap().name, "Renamed");
    }

    #[test]
    fn test_update_missing_bike() {
        let mut store = RecordStore::in_memory().unwrap();
        store.add_bike(&bike("a", true)).unwrap();

        let err = store.update_bike(&bike("ghost", true)).unwrap_err();
        assert!(err.is_not_found());
        // Rolled back: the existing default survives
        assert!(store.fetch_bike("a").unwrap().is_default);
    }

    #[test]
    fn test_set_latest_service() {
        let mut store = RecordStore::in_memory().unwrap();
        store.add_bike(&bike("a", false)).unwrap();
        store.set_latest_service("a", 1_700_000_000).unwrap();

        let a = store.fetch_bike("a").unwrap();
        assert_eq!(a.latest_service, Some(1_700_000_000));
        assert_eq!(a.name, "Bike a");
        assert!(store.set_latest_service("ghost", 1).unwrap_err().is_not_found());
    }

    #[test]
    fn test_ride_requires_parent() {
        let mut store = RecordStore::in_memory().unwrap();
        let err = store.add_ride(&ride("r1", "ghost", 10.0, 0)).unwrap_err();
        assert_eq!(
            err,
            StoreError::ParentNotFound {
                bike_id: "ghost".to_string()
            }
        );
        assert_eq!(store.ride_count().unwrap(), 0);
    }

    #[test]
    fn test_rides_sorted_by_date_descending_with_bike_info() {
        let mut store = RecordStore::in_memory().unwrap();
        store.add_bike(&bike("b1", false)).unwrap();
        store.add_ride(&ride("old", "b1", 10.0, 100)).unwrap();
        store.add_ride(&ride("new", "b1", 20.0, 300)).unwrap();
        store.add_ride(&ride("mid", "b1", 30.0, 200)).unwrap();

        let rides = store.fetch_all_rides().unwrap();
        let ids: Vec<&str> = rides.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
        assert_eq!(rides[0].bike_name, "Bike b1");
        assert_eq!(rides[0].bike_type, 1);

        let bike = store.fetch_bike("b1").unwrap();
        assert_eq!(bike.rides.len(), 3);
        assert_eq!(bike.rides[0].id, "new");
    }

    #[test]
    fn test_update_ride() {
        let mut store = RecordStore::in_memory().unwrap();
        store.add_bike(&bike("b1", false)).unwrap();
        store.add_bike(&bike("b2", false)).unwrap();
        store.add_ride(&ride("r1", "b1", 10.0, 100)).unwrap();

        let mut moved = ride("r1", "b2", 12.5, 100);
        moved.name = "Moved".to_string();
        store.update_ride(&moved).unwrap();

        let r1 = store.fetch_ride("r1").unwrap();
        assert_eq!(r1.bike_id, "b2");
        assert_eq!(r1.distance_km, 12.5);
        assert_eq!(r1.name, "Moved");

        let err = store.update_ride(&ride("r1", "ghost", 1.0, 0)).unwrap_err();
        assert!(matches!(err, StoreError::ParentNotFound { .. }));
        assert!(store.update_ride(&ride("ghost", "b1", 1.0, 0)).unwrap_err().is_not_found());
    }

    #[test]
    fn test_delete_bike_cascades_to_rides() {
        let mut store = RecordStore::in_memory().unwrap();
        store.add_bike(&bike("b1", false)).unwrap();
        store.add_bike(&bike("b2", false)).unwrap();
        store.add_ride(&ride("r1", "b1", 10.0, 100)).unwrap();
        store.add_ride(&ride("r2", "b1", 10.0, 200)).unwrap();
        store.add_ride(&ride("r3", "b2", 10.0, 300)).unwrap();

        store.delete_bike("b1").unwrap();

        assert!(store.fetch_ride("r1").unwrap_err().is_not_found());
        assert!(store.fetch_ride("r2").unwrap_err().is_not_found());
        assert!(store.fetch_ride("r3").is_ok());
        assert_eq!(store.ride_count().unwrap(), 1);
    }

    #[test]
    fn test_delete_missing_records() {
        let mut store = RecordStore::in_memory().unwrap();
        assert!(store.delete_bike("ghost").unwrap_err().is_not_found());
        assert!(store.delete_ride("ghost").unwrap_err().is_not_found());
    }

    #[test]
    fn test_listeners_notified_after_commit_only() {
        let mut store = RecordStore::in_memory().unwrap();
        let recorder = Arc::new(Recorder::default());
        assert!(store.add_listener("recorder", recorder.clone()));
        assert!(!store.add_listener("recorder", recorder.clone()));

        store.add_bike(&bike("b1", false)).unwrap();
        store.delete_ride("ghost").unwrap_err();
        store.add_ride(&ride("r1", "b1", 1.0, 0)).unwrap();
        store.delete_bike("b1").unwrap();

        let changes = recorder.changes.lock().unwrap().clone();
        assert_eq!(
            changes,
            vec![
                StoreChange::Inserted {
                    kind: RecordKind::Bike,
                    id: "b1".to_string()
                },
                StoreChange::Inserted {
                    kind: RecordKind::Ride,
                    id: "r1".to_string()
                },
                StoreChange::Deleted {
                    kind: RecordKind::Bike,
                    id: "b1".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_clear() {
        let mut store = RecordStore::in_memory().unwrap();
        store.add_bike(&bike("b1", true)).unwrap();
        store.add_ride(&ride("r1", "b1", 1.0, 0)).unwrap();
        store.clear().unwrap();

        assert_eq!(store.stats().unwrap(), StoreStats::default());
    }

    #[test]
    fn test_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ridelog.db");
        let path = path.to_str().unwrap();

        {
            let mut store = RecordStore::open(path).unwrap();
            store.add_bike(&bike("b1", true)).unwrap();
            store.add_ride(&ride("r1", "b1", 42.0, 1_000)).unwrap();
        }

        let store = RecordStore::open(path).unwrap();
        let bikes = store.fetch_all_bikes().unwrap();
        assert_eq!(bikes.len(), 1);
        assert_eq!(bikes[0].rides.len(), 1);
        assert_eq!(bikes[0].rides[0].distance_km, 42.0);
    }
}
