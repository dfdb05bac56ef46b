//! Rows as they appear in the GTFS text files.
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct GtfsStop {
    pub stop_id: String,
    #[serde(default)]
    pub stop_name: Option<String>,
    pub stop_lat: f64,
    pub stop_lon: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GtfsRoute {
    pub route_id: String,
    #[serde(default)]
    pub route_short_name: Option<String>,
    #[serde(default)]
    pub route_long_name: Option<String>,
    /// 3 is bus. Feeds for informal transit sometimes use extended types like 700.
    pub route_type: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GtfsStopTime {
    pub trip_id: String,
    pub stop_id: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GtfsTrip {
    pub trip_id: String,
    pub route_id: String,
}
