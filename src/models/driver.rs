use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationStatus {
    #[default]
    Online,
    Offline,
}

/// Last reported position of a driver. `is_active` and `updated_at` gate
/// assignment eligibility; the rest is forwarded to tracking clients as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverLocation {
    pub point: GeoPoint,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
    pub accuracy: Option<f64>,
    pub is_active: bool,
    pub status: LocationStatus,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub name: String,
    pub location: Option<DriverLocation>,
}

impl Driver {
    pub fn has_active_location(&self) -> bool {
        self.location.as_ref().is_some_and(|location| location.is_active)
    }
}
