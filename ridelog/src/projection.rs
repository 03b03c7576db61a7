//! View state derived from live snapshots.
//!
//! Pure functions: they never touch the store and cannot fail.

use std::collections::BTreeMap;
use std::fmt::Display;

use chrono::{Datelike, TimeZone};

use crate::types::{Bike, BikeType, Ride};
use crate::units::DistanceUnit;

/// Chart bars are drawn relative to this distance (kilometers).
pub const CHART_THRESHOLD_KM: f64 = 20_000.0;

#[derive(Debug, Clone, PartialEq)]
pub enum BikesViewState {
    Empty,
    Loaded(Vec<Bike>),
}

/// Rides of one calendar month.
#[derive(Debug, Clone, PartialEq)]
pub struct RidesSection {
    /// Month and year, e.g. "February 2024"
    pub title: String,
    pub year: i32,
    pub month: u32,
    pub rides: Vec<Ride>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RidesViewState {
    Empty,
    Loaded(Vec<RidesSection>),
}

/// One bar of the per-type distance chart.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartEntry {
    pub bike_type: BikeType,
    pub label: &'static str,
    pub ride_count: usize,
    /// Summed distance in the display unit
    pub distance: f64,
    /// `distance` over the chart threshold in the same unit
    pub percentage: f64,
}

pub fn project_bikes(bikes: Vec<Bike>) -> BikesViewState {
    if bikes.is_empty() {
        BikesViewState::Empty
    } else {
        BikesViewState::Loaded(bikes)
    }
}

/// Group rides by calendar month in `tz`, most recent month first. Rides keep
/// their incoming order inside a section.
pub fn project_rides<Tz>(rides: Vec<Ride>, tz: &Tz) -> RidesViewState
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    if rides.is_empty() {
        return RidesViewState::Empty;
    }

    let mut sections: BTreeMap<(i32, u32), RidesSection> = BTreeMap::new();
    for ride in rides {
        let local = ride.date.with_timezone(tz);
        let (year, month) = (local.year(), local.month());
        sections
            .entry((year, month))
            .or_insert_with(|| RidesSection {
                title: local.format("%B %Y").to_string(),
                year,
                month,
                rides: Vec::new(),
            })
            .rides
            .push(ride);
    }

    RidesViewState::Loaded(sections.into_values().rev().collect())
}

/// Distance per bike type, in `BikeType::ALL` order. Types without rides are
/// included with zero distance.
pub fn project_chart(rides: &[Ride], unit: DistanceUnit) -> Vec<ChartEntry> {
    let threshold = unit.from_km(CHART_THRESHOLD_KM);
    BikeType::ALL
        .iter()
        .map(|&bike_type| {
            let (ride_count, distance) = rides
                .iter()
                .filter(|r| r.bike_type == bike_type)
                .fold((0, 0.0), |(n, sum), r| (n + 1, sum + r.distance));
            ChartEntry {
                bike_type,
                label: bike_type.chart_label(),
                ride_count,
                distance,
                percentage: (distance / threshold).max(0.0),
            }
        })
        .collect()
}

/// Total distance across every bar.
pub fn chart_total(entries: &[ChartEntry]) -> f64 {
    entries.iter().map(|e| e.distance).sum()
}

pub fn default_bike(bikes: &[Bike]) -> Option<&Bike> {
    bikes.iter().find(|b| b.is_default)
}
