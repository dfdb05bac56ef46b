use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// A position report submitted by a vehicle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GpsPing {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
    /// 0-1
    pub occupancy: f64,
    #[serde(default)]
    pub route_id: Option<String>,
}

/// A ping generated from the static feed to bootstrap the feature store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyntheticPing {
    pub timestamp: NaiveDateTime,
    pub latitude: f64,
    pub longitude: f64,
    pub stop_id: String,
    pub route_id: String,
    pub occupancy: f64,
    pub hour: u8,
    pub day_of_week: u8,
}
