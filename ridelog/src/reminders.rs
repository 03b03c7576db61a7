//! Service reminder payloads for the platform notification scheduler.

use uuid::Uuid;

use crate::config::Settings;
use crate::types::Bike;

/// A bike that is close to (or past) its service threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceReminder {
    pub bike_id: Uuid,
    pub bike_name: String,
    pub color: String,
    /// Distance left until service in the display unit; negative when overdue
    pub remaining: f64,
    pub overdue: bool,
}

impl ServiceReminder {
    /// Notification body, e.g. "Gravel: 42 KM until service".
    pub fn message(&self, settings: &Settings) -> String {
        if self.overdue {
            format!("{}: service overdue", self.bike_name)
        } else {
            format!(
                "{}: {:.0} {} until service",
                self.bike_name, self.remaining, settings.distance_unit
            )
        }
    }
}

/// Bikes whose remaining distance is within the configured reminder
/// distance. Empty when reminders are switched off.
///
/// `bikes` must have been mapped in `settings.distance_unit`.
pub fn service_reminders(bikes: &[Bike], settings: &Settings) -> Vec<ServiceReminder> {
    if !settings.service_reminder_on {
        return Vec::new();
    }

    let limit = f64::from(settings.service_reminder_distance);
    bikes
        .iter()
        .filter(|bike| bike.service_remaining() <= limit)
        .map(|bike| ServiceReminder {
            bike_id: bike.id,
            bike_name: bike.name.clone(),
            color: bike.color.clone(),
            remaining: bike.service_remaining(),
            overdue: bike.is_service_overdue(),
        })
        .collect()
}
