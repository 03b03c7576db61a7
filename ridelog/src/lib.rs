//! Ridelog - bike and ride tracking core for the mobile apps
//!
//! This crate provides:
//! - SQLite record store for bikes and their rides
//! - Live snapshot streams that follow every committed change
//! - Repository facade with display unit conversion
//! - View state projection and service reminder payloads
//! - UniFFI bindings for iOS/Android (feature `ffi`)

pub mod error;
pub use error::{OptionExt, RecordKind, Result, StoreError};

pub mod types;
pub use types::{Bike, BikeType, Ride, WheelSize};

pub mod units;
pub use units::{DistanceUnit, KM_PER_MILE, UnknownUnit};

pub mod config;
pub use config::{Settings, SettingsError, SettingsStore};

// Storage and change propagation
mod migrations;
pub mod persistence;
pub use persistence::{
    BikeEntity, ChangeListener, RecordStore, RideEntity, StoreChange, StoreStats,
};

pub mod broadcast;
pub use broadcast::{Broadcaster, Snapshot, Subscription};

pub mod database;
pub use database::Database;

pub mod repository;
pub use repository::{
    BikeStream, BikesRepository, LiveStream, Repositories, RideStream, RidesRepository,
};

pub mod projection;
pub use projection::{BikesViewState, ChartEntry, RidesSection, RidesViewState};

pub mod reminders;
pub use reminders::{ServiceReminder, service_reminders};

// FFI bindings for mobile platforms
#[cfg(feature = "ffi")]
pub mod ffi;

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!();

/// Initialize logging for Android
#[cfg(target_os = "android")]
pub fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("ridelog"),
    );
}

/// Initialize logging for iOS
#[cfg(target_os = "ios")]
pub fn init_logging() {
    use log::LevelFilter;
    use std::sync::Once;

    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = oslog::OsLogger::new("ridelog")
            .level_filter(LevelFilter::Debug)
            .init();
    });
}

#[cfg(not(any(target_os = "android", target_os = "ios")))]
pub fn init_logging() {
    // No-op elsewhere; hosts and tests install their own logger
}
