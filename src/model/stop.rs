use serde::{Deserialize, Serialize};

use super::gtfs_model::GtfsStop;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub stop_id: String,
    pub stop_name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl From<GtfsStop> for Stop {
    fn from(value: GtfsStop) -> Self {
        let stop_name = value
            .stop_name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| format!("Stop {}", value.stop_id));

        Stop {
            stop_id: value.stop_id,
            stop_name,
            latitude: value.stop_lat,
            longitude: value.stop_lon,
        }
    }
}

/// A stop matched to a query coordinate. Built per request, never stored.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NearestStopMatch {
    pub stop: Stop,
    pub distance_km: f64,
    pub walking_time_minutes: u32,
}
