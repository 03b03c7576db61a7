//! Entity <-> domain conversion at the repository boundary.
//!
//! Stored distances are kilometers; domain values carry the display unit that
//! was active when they were mapped. Timestamps are whole Unix seconds.

use chrono::{DateTime, Utc};
use log::warn;
use uuid::Uuid;

use crate::error::{RecordKind, Result, StoreError};
use crate::persistence::{BikeEntity, RideEntity};
use crate::types::{Bike, BikeType, Ride, WheelSize};
use crate::units::DistanceUnit;

fn parse_id(kind: RecordKind, owner: &str, raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|e| StoreError::mapping(kind, owner, format!("invalid uuid '{}': {}", raw, e)))
}

fn parse_timestamp(kind: RecordKind, id: &str, secs: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or_else(|| StoreError::mapping(kind, id, format!("timestamp {} out of range", secs)))
}

fn parse_bike_type(kind: RecordKind, id: &str, raw: i64) -> Result<BikeType> {
    BikeType::from_raw(raw)
        .ok_or_else(|| StoreError::mapping(kind, id, format!("unknown bike type {}", raw)))
}

pub(crate) fn ride_to_domain(entity: &RideEntity, unit: DistanceUnit) -> Result<Ride> {
    let kind = RecordKind::Ride;
    let duration = u32::try_from(entity.duration_minutes).map_err(|_| {
        StoreError::mapping(
            kind,
            &entity.id,
            format!("duration {} out of range", entity.duration_minutes),
        )
    })?;

    Ok(Ride {
        id: parse_id(kind, &entity.id, &entity.id)?,
        name: entity.name.clone(),
        distance: unit.from_km(entity.distance_km),
        duration,
        date: parse_timestamp(kind, &entity.id, entity.date)?,
        bike_id: parse_id(kind, &entity.id, &entity.bike_id)?,
        bike_name: entity.bike_name.clone(),
        bike_type: parse_bike_type(kind, &entity.id, entity.bike_type)?,
    })
}

/// Map a bike and all of its rides. One unmappable ride fails the whole bike,
/// since its derived service figures would be wrong.
pub(crate) fn bike_to_domain(entity: &BikeEntity, unit: DistanceUnit) -> Result<Bike> {
    let kind = RecordKind::Bike;
    let wheel_size = WheelSize::from_raw(entity.wheel_size).ok_or_else(|| {
        StoreError::mapping(
            kind,
            &entity.id,
            format!("unknown wheel size {}", entity.wheel_size),
        )
    })?;
    let latest_service = entity
        .latest_service
        .map(|secs| parse_timestamp(kind, &entity.id, secs))
        .transpose()?;
    let rides = entity
        .rides
        .iter()
        .map(|ride| {
            ride_to_domain(ride, unit).map_err(|e| {
                StoreError::mapping(kind, &entity.id, format!("ride '{}': {}", ride.id, e))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Bike {
        id: parse_id(kind, &entity.id, &entity.id)?,
        bike_type: parse_bike_type(kind, &entity.id, entity.bike_type)?,
        name: entity.name.clone(),
        color: entity.color.clone(),
        wheel_size,
        service_due: unit.from_km(entity.service_due_km),
        is_default: entity.is_default,
        latest_service,
        rides,
    })
}

pub(crate) fn bike_to_entity(bike: &Bike, unit: DistanceUnit) -> BikeEntity {
    BikeEntity {
        id: bike.id.to_string(),
        bike_type: bike.bike_type.raw_value(),
        name: bike.name.clone(),
        color: bike.color.clone(),
        wheel_size: bike.wheel_size.raw_value(),
        service_due_km: unit.to_km(bike.service_due),
        is_default: bike.is_default,
        latest_service: bike.latest_service.map(|d| d.timestamp()),
        rides: Vec::new(),
    }
}

pub(crate) fn ride_to_entity(ride: &Ride, unit: DistanceUnit) -> RideEntity {
    RideEntity {
        id: ride.id.to_string(),
        bike_id: ride.bike_id.to_string(),
        bike_name: ride.bike_name.clone(),
        bike_type: ride.bike_type.raw_value(),
        name: ride.name.clone(),
        distance_km: unit.to_km(ride.distance),
        duration_minutes: i64::from(ride.duration),
        date: ride.date.timestamp(),
    }
}

/// Map a snapshot, dropping entities that cannot be mapped.
pub(crate) fn map_snapshot<E, T>(
    entities: &[E],
    unit: DistanceUnit,
    map: fn(&E, DistanceUnit) -> Result<T>,
) -> Vec<T> {
    entities
        .iter()
        .filter_map(|entity| match map(entity, unit) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("[Repository] Skipping record in snapshot: {}", e);
                None
            }
        })
        .collect()
}
