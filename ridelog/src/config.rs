//! User settings: display unit and service reminder preferences.
//!
//! Settings live in a small JSON file next to the database. The repositories
//! read the distance unit synchronously at the moment of each conversion; a
//! unit change does not re-broadcast snapshots that were already delivered.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::units::DistanceUnit;

/// Default distance (display unit) below which a service reminder fires.
pub const DEFAULT_SERVICE_REMINDER_DISTANCE: u32 = 100;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("settings json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Persisted user preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub distance_unit: DistanceUnit,
    pub service_reminder_on: bool,
    /// Reminder threshold, in `distance_unit`
    pub service_reminder_distance: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            distance_unit: DistanceUnit::Km,
            service_reminder_on: true,
            service_reminder_distance: DEFAULT_SERVICE_REMINDER_DISTANCE,
        }
    }
}

/// Thread-safe settings holder, optionally backed by a JSON file.
#[derive(Debug)]
pub struct SettingsStore {
    path: Option<PathBuf>,
    current: RwLock<Settings>,
}

impl SettingsStore {
    /// Settings kept only in memory (tests, previews).
    pub fn in_memory(settings: Settings) -> Self {
        Self {
            path: None,
            current: RwLock::new(settings),
        }
    }

    /// Load settings from `path`, creating the file with defaults if missing.
    ///
    /// A corrupt file is replaced with defaults rather than failing startup.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref().to_path_buf();
        let settings = match std::fs::read_to_string(&path) {
            Ok(json) => match serde_json::from_str::<Settings>(&json) {
                Ok(s) => s,
                Err(e) => {
                    warn!("[Settings] Ignoring unreadable settings at {:?}: {}", path, e);
                    Settings::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Settings::default(),
            Err(e) => return Err(e.into()),
        };

        let store = Self {
            path: Some(path),
            current: RwLock::new(settings),
        };
        store.save()?;
        info!("[Settings] Loaded: {:?}", store.snapshot());
        Ok(store)
    }

    /// Copy of the current settings.
    pub fn snapshot(&self) -> Settings {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn distance_unit(&self) -> DistanceUnit {
        self.snapshot().distance_unit
    }

    pub fn service_reminder_on(&self) -> bool {
        self.snapshot().service_reminder_on
    }

    pub fn service_reminder_distance(&self) -> u32 {
        self.snapshot().service_reminder_distance
    }

    pub fn set_distance_unit(&self, unit: DistanceUnit) -> Result<(), SettingsError> {
        self.update(|s| s.distance_unit = unit)
    }

    pub fn set_service_reminder_on(&self, on: bool) -> Result<(), SettingsError> {
        self.update(|s| s.service_reminder_on = on)
    }

    pub fn set_service_reminder_distance(&self, distance: u32) -> Result<(), SettingsError> {
        self.update(|s| s.service_reminder_distance = distance)
    }

    fn update(&self, f: impl FnOnce(&mut Settings)) -> Result<(), SettingsError> {
        {
            let mut guard = match self.current.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            f(&mut guard);
        }
        self.save()
    }

    fn save(&self) -> Result<(), SettingsError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(&self.snapshot())?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::in_memory(Settings::default())
    }
}
