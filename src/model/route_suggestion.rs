use serde::{Deserialize, Serialize};

/// A candidate new route centred on a high demand area.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteSuggestion {
    #[serde(rename = "suggested_route_id", alias = "suggested_id")]
    pub suggested_id: String,
    pub center_lat: f64,
    pub center_lon: f64,
    pub estimated_demand: f64,
    pub peak_hour: u8,
    #[serde(rename = "coverage_stops", alias = "coverage_stop_count")]
    pub coverage_stop_count: u32,
    /// estimated_demand * coverage_stop_count
    pub priority_score: f64,
}
