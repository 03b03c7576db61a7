//! FFI bindings for mobile platforms (iOS/Android).
//!
//! This module provides the UniFFI bindings that expose the repositories to
//! Kotlin and Swift. Ids cross the boundary as strings, dates as Unix seconds
//! and distances in the display unit. Live observation is pushed to foreign
//! callback interfaces from a small background runtime.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, FixedOffset, Utc};
use futures::StreamExt;
use futures::executor::block_on;
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use thiserror::Error;
use tokio::runtime::Runtime;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::config::SettingsStore;
use crate::database::Database;
use crate::error::StoreError;
use crate::init_logging;
use crate::projection::{self, RidesViewState};
use crate::reminders;
use crate::repository::Repositories;
use crate::types::{Bike, BikeType, Ride, WheelSize};
use crate::units::DistanceUnit;

// ============================================================================
// Global state
// ============================================================================

/// Repositories shared by every FFI call.
static REPOSITORIES: Lazy<Mutex<Option<Repositories>>> = Lazy::new(|| Mutex::new(None));

/// Runtime that pumps live snapshots into foreign observers.
static OBSERVER_RUNTIME: Lazy<Option<Runtime>> = Lazy::new(|| {
    match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("ridelog-observers")
        .build()
    {
        Ok(runtime) => Some(runtime),
        Err(e) => {
            warn!("[FFI] Observer runtime unavailable: {}", e);
            None
        }
    }
});

fn repositories() -> Result<Repositories, FfiError> {
    let guard = REPOSITORIES.lock().map_err(|_| FfiError::Internal {
        message: "repository lock poisoned".to_string(),
    })?;
    guard.clone().ok_or(FfiError::NotInitialized)
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error, uniffi::Error)]
#[uniffi(flat_error)]
pub enum FfiError {
    #[error("ridelog is not initialized")]
    NotInitialized,
    #[error("{message}")]
    NotFound { message: String },
    #[error("{message}")]
    WriteFailed { message: String },
    #[error("{message}")]
    MappingFailed { message: String },
    #[error("{message}")]
    ParentNotFound { message: String },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("{message}")]
    Internal { message: String },
}

impl From<StoreError> for FfiError {
    fn from(e: StoreError) -> Self {
        let message = e.to_string();
        match e {
            StoreError::NotFound { .. } => FfiError::NotFound { message },
            StoreError::WriteFailed { .. } => FfiError::WriteFailed { message },
            StoreError::MappingFailed { .. } => FfiError::MappingFailed { message },
            StoreError::ParentNotFound { .. } => FfiError::ParentNotFound { message },
            StoreError::Internal { .. } => FfiError::Internal { message },
        }
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid, FfiError> {
    Uuid::parse_str(raw).map_err(|e| FfiError::InvalidInput {
        message: format!("'{}' is not a valid id: {}", raw, e),
    })
}

/// Empty ids ask for a freshly assigned one.
fn parse_or_assign_uuid(raw: &str) -> Result<Uuid, FfiError> {
    if raw.is_empty() {
        Ok(Uuid::now_v7())
    } else {
        parse_uuid(raw)
    }
}

fn parse_timestamp(secs: i64) -> Result<DateTime<Utc>, FfiError> {
    DateTime::<Utc>::from_timestamp(secs, 0).ok_or_else(|| FfiError::InvalidInput {
        message: format!("timestamp {} out of range", secs),
    })
}

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiRide {
    /// Empty on input to assign a new id
    pub id: String,
    pub name: String,
    /// Distance in the display unit
    pub distance: f64,
    /// Duration in minutes
    pub duration: u32,
    /// Unix timestamp (seconds since epoch)
    pub date: i64,
    pub bike_id: String,
    /// Resolved from the owning bike; ignored on input
    pub bike_name: String,
    /// Resolved from the owning bike; ignored on input
    pub bike_type: BikeType,
}

impl From<Ride> for FfiRide {
    fn from(r: Ride) -> Self {
        Self {
            id: r.id.to_string(),
            name: r.name,
            distance: r.distance,
            duration: r.duration,
            date: r.date.timestamp(),
            bike_id: r.bike_id.to_string(),
            bike_name: r.bike_name,
            bike_type: r.bike_type,
        }
    }
}

impl TryFrom<FfiRide> for Ride {
    type Error = FfiError;

    fn try_from(r: FfiRide) -> Result<Self, FfiError> {
        Ok(Self {
            id: parse_or_assign_uuid(&r.id)?,
            name: r.name,
            distance: r.distance,
            duration: r.duration,
            date: parse_timestamp(r.date)?,
            bike_id: parse_uuid(&r.bike_id)?,
            bike_name: r.bike_name,
            bike_type: r.bike_type,
        })
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiBike {
    /// Empty on input to assign a new id
    pub id: String,
    pub bike_type: BikeType,
    pub name: String,
    pub color: String,
    pub wheel_size: WheelSize,
    /// Service threshold in the display unit
    pub service_due: f64,
    pub is_default: bool,
    /// Unix timestamp (seconds since epoch)
    pub latest_service: Option<i64>,
    /// Ignored on input
    pub rides: Vec<FfiRide>,
    // Derived values, ignored on input
    pub rides_total_distance: f64,
    pub service_due_percentage: f64,
    pub formatted_service_due: String,
    pub formatted_rides_total_distance: String,
}

impl From<Bike> for FfiBike {
    fn from(b: Bike) -> Self {
        Self {
            rides_total_distance: b.rides_total_distance(),
            service_due_percentage: b.service_due_percentage(),
            formatted_service_due: b.formatted_service_due(),
            formatted_rides_total_distance: b.formatted_rides_total_distance(),
            id: b.id.to_string(),
            bike_type: b.bike_type,
            name: b.name,
            color: b.color,
            wheel_size: b.wheel_size,
            service_due: b.service_due,
            is_default: b.is_default,
            latest_service: b.latest_service.map(|d| d.timestamp()),
            rides: b.rides.into_iter().map(FfiRide::from).collect(),
        }
    }
}

impl TryFrom<FfiBike> for Bike {
    type Error = FfiError;

    fn try_from(b: FfiBike) -> Result<Self, FfiError> {
        Ok(Self {
            id: parse_or_assign_uuid(&b.id)?,
            bike_type: b.bike_type,
            name: b.name,
            color: b.color,
            wheel_size: b.wheel_size,
            service_due: b.service_due,
            is_default: b.is_default,
            latest_service: b.latest_service.map(parse_timestamp).transpose()?,
            rides: Vec::new(),
        })
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSettings {
    pub distance_unit: DistanceUnit,
    pub service_reminder_on: bool,
    pub service_reminder_distance: u32,
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiServiceReminder {
    pub bike_id: String,
    pub bike_name: String,
    pub color: String,
    pub remaining: f64,
    pub overdue: bool,
    /// Ready-to-show notification body
    pub message: String,
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiRidesSection {
    pub title: String,
    pub rides: Vec<FfiRide>,
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiChartEntry {
    pub bike_type: BikeType,
    pub label: String,
    pub distance: f64,
    pub percentage: f64,
}

// ============================================================================
// Callback Interfaces
// ============================================================================

/// Receives the full bike list after every committed change.
#[uniffi::export(callback_interface)]
pub trait BikesObserver: Send + Sync {
    fn on_bikes(&self, bikes: Vec<FfiBike>);
}

/// Receives the full ride list after every committed change.
#[uniffi::export(callback_interface)]
pub trait RidesObserver: Send + Sync {
    fn on_rides(&self, rides: Vec<FfiRide>);
}

/// Keeps an observation alive until cancelled or dropped.
#[derive(uniffi::Object)]
pub struct ObservationHandle {
    cancel: Mutex<Option<oneshot::Sender<()>>>,
}

#[uniffi::export]
impl ObservationHandle {
    /// Stop delivering snapshots. Safe to call more than once.
    pub fn cancel(&self) {
        let sender = match self.cancel.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(sender) = sender {
            let _ = sender.send(());
        }
    }
}

fn spawn_observation<S, F>(stream: S, mut deliver: F) -> Result<Arc<ObservationHandle>, FfiError>
where
    S: futures::Stream + Send + Unpin + 'static,
    S::Item: Send,
    F: FnMut(S::Item) + Send + 'static,
{
    let runtime = OBSERVER_RUNTIME.as_ref().ok_or_else(|| FfiError::Internal {
        message: "observer runtime unavailable".to_string(),
    })?;
    let (cancel_tx, cancel_rx) = oneshot::channel();

    runtime.spawn(async move {
        // Ends on cancel() and also when the handle is dropped
        let mut stream = stream.take_until(cancel_rx);
        while let Some(item) = stream.next().await {
            deliver(item);
        }
        debug!("[FFI] Observation ended");
    });

    Ok(Arc::new(ObservationHandle {
        cancel: Mutex::new(Some(cancel_tx)),
    }))
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Open the database and settings file and enable live updates.
/// Call this once at app startup before any other function here.
#[uniffi::export]
pub fn ridelog_init(db_path: String, settings_path: String) -> bool {
    init_logging();
    info!("[FFI] Initializing with db: {}", db_path);

    let database = match Database::open(&db_path) {
        Ok(database) => database,
        Err(e) => {
            warn!("[FFI] Failed to open database: {}", e);
            return false;
        }
    };
    let settings = match SettingsStore::open(&settings_path) {
        Ok(settings) => settings,
        Err(e) => {
            warn!("[FFI] Failed to open settings: {}", e);
            return false;
        }
    };

    let repos = Repositories::new(Arc::new(database), Arc::new(settings));
    repos.setup();

    match REPOSITORIES.lock() {
        Ok(mut guard) => {
            *guard = Some(repos);
            info!("[FFI] Initialized successfully");
            true
        }
        Err(_) => false,
    }
}

#[uniffi::export]
pub fn ridelog_is_initialized() -> bool {
    REPOSITORIES
        .lock()
        .map(|guard| guard.is_some())
        .unwrap_or(false)
}

// ============================================================================
// Bikes
// ============================================================================

#[uniffi::export]
pub fn ffi_observe_bikes(
    observer: Box<dyn BikesObserver>,
) -> Result<Arc<ObservationHandle>, FfiError> {
    let stream = repositories()?.bikes.observe_all();
    spawn_observation(stream, move |bikes: Vec<Bike>| {
        observer.on_bikes(bikes.into_iter().map(FfiBike::from).collect());
    })
}

#[uniffi::export]
pub fn ffi_get_bikes() -> Result<Vec<FfiBike>, FfiError> {
    let bikes = block_on(repositories()?.bikes.get_all())?;
    Ok(bikes.into_iter().map(FfiBike::from).collect())
}

#[uniffi::export]
pub fn ffi_get_bike(id: String) -> Result<FfiBike, FfiError> {
    let bike = block_on(repositories()?.bikes.get_one(parse_uuid(&id)?))?;
    Ok(bike.into())
}

#[uniffi::export]
pub fn ffi_get_default_bike() -> Result<Option<FfiBike>, FfiError> {
    let bike = block_on(repositories()?.bikes.default_bike())?;
    Ok(bike.map(FfiBike::from))
}

/// Returns the id of the stored bike.
#[uniffi::export]
pub fn ffi_add_bike(bike: FfiBike) -> Result<String, FfiError> {
    let bike = Bike::try_from(bike)?;
    block_on(repositories()?.bikes.add(&bike))?;
    Ok(bike.id.to_string())
}

#[uniffi::export]
pub fn ffi_update_bike(bike: FfiBike) -> Result<(), FfiError> {
    let bike = Bike::try_from(bike)?;
    Ok(block_on(repositories()?.bikes.update(&bike))?)
}

#[uniffi::export]
pub fn ffi_delete_bike(id: String) -> Result<(), FfiError> {
    Ok(block_on(repositories()?.bikes.delete(parse_uuid(&id)?))?)
}

#[uniffi::export]
pub fn ffi_set_default_bike(id: String) -> Result<(), FfiError> {
    Ok(block_on(repositories()?.bikes.set_default(parse_uuid(&id)?))?)
}

#[uniffi::export]
pub fn ffi_set_latest_service(id: String, date: i64) -> Result<(), FfiError> {
    let id = parse_uuid(&id)?;
    let date = parse_timestamp(date)?;
    Ok(block_on(repositories()?.bikes.set_latest_service(id, date))?)
}

// ============================================================================
// Rides
// ============================================================================

/// Observe every ride, or only the rides of `bike_id` when given.
#[uniffi::export]
pub fn ffi_observe_rides(
    observer: Box<dyn RidesObserver>,
    bike_id: Option<String>,
) -> Result<Arc<ObservationHandle>, FfiError> {
    let repos = repositories()?;
    let deliver = move |rides: Vec<Ride>| {
        observer.on_rides(rides.into_iter().map(FfiRide::from).collect());
    };
    match bike_id {
        Some(bike_id) => {
            let stream = repos.rides.observe_for_bike(parse_uuid(&bike_id)?);
            spawn_observation(stream, deliver)
        }
        None => spawn_observation(repos.rides.observe_all(), deliver),
    }
}

#[uniffi::export]
pub fn ffi_get_rides() -> Result<Vec<FfiRide>, FfiError> {
    let rides = block_on(repositories()?.rides.get_all())?;
    Ok(rides.into_iter().map(FfiRide::from).collect())
}

#[uniffi::export]
pub fn ffi_get_ride(id: String) -> Result<FfiRide, FfiError> {
    let ride = block_on(repositories()?.rides.get_one(parse_uuid(&id)?))?;
    Ok(ride.into())
}

/// Returns the id of the stored ride.
#[uniffi::export]
pub fn ffi_add_ride(ride: FfiRide) -> Result<String, FfiError> {
    let ride = Ride::try_from(ride)?;
    block_on(repositories()?.rides.add(&ride))?;
    Ok(ride.id.to_string())
}

#[uniffi::export]
pub fn ffi_update_ride(ride: FfiRide) -> Result<(), FfiError> {
    let ride = Ride::try_from(ride)?;
    Ok(block_on(repositories()?.rides.update(&ride))?)
}

#[uniffi::export]
pub fn ffi_delete_ride(id: String) -> Result<(), FfiError> {
    Ok(block_on(repositories()?.rides.delete(parse_uuid(&id)?))?)
}

/// Rides grouped by month in the caller's UTC offset, newest month first.
#[uniffi::export]
pub fn ffi_ride_sections(utc_offset_seconds: i32) -> Result<Vec<FfiRidesSection>, FfiError> {
    let offset = FixedOffset::east_opt(utc_offset_seconds).ok_or_else(|| {
        FfiError::InvalidInput {
            message: format!("utc offset {} out of range", utc_offset_seconds),
        }
    })?;
    let rides = block_on(repositories()?.rides.get_all())?;

    Ok(match projection::project_rides(rides, &offset) {
        RidesViewState::Empty => Vec::new(),
        RidesViewState::Loaded(sections) => sections
            .into_iter()
            .map(|s| FfiRidesSection {
                title: s.title,
                rides: s.rides.into_iter().map(FfiRide::from).collect(),
            })
            .collect(),
    })
}

#[uniffi::export]
pub fn ffi_rides_chart() -> Result<Vec<FfiChartEntry>, FfiError> {
    let repos = repositories()?;
    let rides = block_on(repos.rides.get_all())?;
    let chart = projection::project_chart(&rides, repos.settings.distance_unit());
    Ok(chart
        .into_iter()
        .map(|e| FfiChartEntry {
            bike_type: e.bike_type,
            label: e.label.to_string(),
            distance: e.distance,
            percentage: e.percentage,
        })
        .collect())
}

// ============================================================================
// Settings & Reminders
// ============================================================================

#[uniffi::export]
pub fn ffi_get_settings() -> Result<FfiSettings, FfiError> {
    let settings = repositories()?.settings.snapshot();
    Ok(FfiSettings {
        distance_unit: settings.distance_unit,
        service_reminder_on: settings.service_reminder_on,
        service_reminder_distance: settings.service_reminder_distance,
    })
}

/// Already delivered snapshots keep their unit; the next one uses `unit`.
#[uniffi::export]
pub fn ffi_set_distance_unit(unit: DistanceUnit) -> Result<(), FfiError> {
    repositories()?
        .settings
        .set_distance_unit(unit)
        .map_err(|e| FfiError::Internal {
            message: e.to_string(),
        })
}

#[uniffi::export]
pub fn ffi_set_service_reminder(on: bool, distance: u32) -> Result<(), FfiError> {
    let repos = repositories()?;
    repos
        .settings
        .set_service_reminder_on(on)
        .and_then(|_| repos.settings.set_service_reminder_distance(distance))
        .map_err(|e| FfiError::Internal {
            message: e.to_string(),
        })
}

/// Bikes that need a service notification under the current settings.
#[uniffi::export]
pub fn ffi_service_reminders() -> Result<Vec<FfiServiceReminder>, FfiError> {
    let repos = repositories()?;
    let settings = repos.settings.snapshot();
    let bikes = block_on(repos.bikes.get_all())?;

    Ok(reminders::service_reminders(&bikes, &settings)
        .into_iter()
        .map(|r| FfiServiceReminder {
            message: r.message(&settings),
            bike_id: r.bike_id.to_string(),
            bike_name: r.bike_name,
            color: r.color,
            remaining: r.remaining,
            overdue: r.overdue,
        })
        .collect())
}
