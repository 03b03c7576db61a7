//! Domain value types handed to the UI layer.
//!
//! These are immutable snapshots with no back-reference to the store. Distances
//! are expressed in whatever display unit was active when the value was mapped
//! out of the repository.

use chrono::{DateTime, Utc};
use uuid::Uuid;

// ============================================================================
// Enumerations
// ============================================================================

/// Kind of bike. Raw values are what the store persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum BikeType {
    Mountain,
    Road,
    Electric,
    Hybrid,
}

impl BikeType {
    pub const ALL: [BikeType; 4] = [
        BikeType::Mountain,
        BikeType::Road,
        BikeType::Electric,
        BikeType::Hybrid,
    ];

    pub fn raw_value(self) -> i64 {
        match self {
            BikeType::Mountain => 1,
            BikeType::Road => 2,
            BikeType::Electric => 3,
            BikeType::Hybrid => 4,
        }
    }

    pub fn from_raw(raw: i64) -> Option<Self> {
        match raw {
            1 => Some(BikeType::Mountain),
            2 => Some(BikeType::Road),
            3 => Some(BikeType::Electric),
            4 => Some(BikeType::Hybrid),
            _ => None,
        }
    }

    /// Short label used by the rides chart legend.
    pub fn chart_label(self) -> &'static str {
        match self {
            BikeType::Mountain => "MTB",
            BikeType::Road => "Road",
            BikeType::Electric => "E-Bike",
            BikeType::Hybrid => "Hybrid",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum WheelSize {
    Big,
    Small,
}

impl WheelSize {
    pub fn raw_value(self) -> i64 {
        match self {
            WheelSize::Big => 1,
            WheelSize::Small => 2,
        }
    }

    pub fn from_raw(raw: i64) -> Option<Self> {
        match raw {
            1 => Some(WheelSize::Big),
            2 => Some(WheelSize::Small),
            _ => None,
        }
    }
}

// ============================================================================
// Ride
// ============================================================================

/// A logged trip against a bike.
#[derive(Debug, Clone, PartialEq)]
pub struct Ride {
    pub id: Uuid,
    pub name: String,
    /// Distance in the display unit
    pub distance: f64,
    /// Duration in minutes
    pub duration: u32,
    pub date: DateTime<Utc>,
    pub bike_id: Uuid,
    /// Denormalized from the owning bike at read time
    pub bike_name: String,
    pub bike_type: BikeType,
}

impl Ride {
    /// New ride with a freshly assigned id. Name and type of the bike are
    /// filled in from the store when the ride is read back.
    pub fn new(
        name: impl Into<String>,
        distance: f64,
        duration: u32,
        date: DateTime<Utc>,
        bike: &Bike,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            distance,
            duration,
            date,
            bike_id: bike.id,
            bike_name: bike.name.clone(),
            bike_type: bike.bike_type,
        }
    }
}

// ============================================================================
// Bike
// ============================================================================

/// A tracked bike with its service threshold and rides.
#[derive(Debug, Clone, PartialEq)]
pub struct Bike {
    pub id: Uuid,
    pub bike_type: BikeType,
    pub name: String,
    /// Opaque colour tag (e.g. "bikeOrange")
    pub color: String,
    pub wheel_size: WheelSize,
    /// Service-due threshold in the display unit
    pub service_due: f64,
    pub is_default: bool,
    pub latest_service: Option<DateTime<Utc>>,
    /// Rides owned by this bike. Ignored on writes.
    pub rides: Vec<Ride>,
}

impl Bike {
    /// New, non-default bike with a freshly assigned id and no rides.
    pub fn new(
        bike_type: BikeType,
        name: impl Into<String>,
        color: impl Into<String>,
        wheel_size: WheelSize,
        service_due: f64,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            bike_type,
            name: name.into(),
            color: color.into(),
            wheel_size,
            service_due,
            is_default: false,
            latest_service: None,
            rides: Vec::new(),
        }
    }

    pub fn with_default(mut self, is_default: bool) -> Self {
        self.is_default = is_default;
        self
    }

    /// Sum of all ride distances.
    pub fn rides_total_distance(&self) -> f64 {
        self.rides.iter().map(|r| r.distance).sum()
    }

    /// Ridden distance as a fraction of the service threshold.
    ///
    /// 0 when nothing was ridden, 1 when the threshold is not positive but
    /// some distance was ridden. Not clamped; see [`Bike::service_progress`].
    pub fn service_due_percentage(&self) -> f64 {
        let total = self.rides_total_distance();
        if total <= 0.0 {
            0.0
        } else if self.service_due <= 0.0 {
            1.0
        } else {
            total / self.service_due
        }
    }

    /// [`Bike::service_due_percentage`] clamped to `[0, 1]` for progress bars.
    pub fn service_progress(&self) -> f64 {
        self.service_due_percentage().clamp(0.0, 1.0)
    }

    /// Distance left until service. Negative once overdue.
    pub fn service_remaining(&self) -> f64 {
        self.service_due - self.rides_total_distance()
    }

    pub fn is_service_overdue(&self) -> bool {
        self.service_remaining() <= 0.0
    }

    /// Remaining distance without decimals, or "Overdue".
    pub fn formatted_service_due(&self) -> String {
        let remaining = self.service_remaining();
        if remaining > 0.0 {
            format!("{:.0}", remaining)
        } else {
            "Overdue".to_string()
        }
    }

    pub fn formatted_rides_total_distance(&self) -> String {
        format!("{:.1}", self.rides_total_distance())
    }
}
