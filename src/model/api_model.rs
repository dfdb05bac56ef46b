//! Request and response bodies of the HTTP API.
use std::collections::BTreeMap;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::route_suggestion::RouteSuggestion;

#[derive(Debug, Deserialize, Serialize)]
pub struct DemandRequest {
    pub stop_id: String,
    /// 0-23
    pub hour: i32,
    /// 0 is Monday
    pub day_of_week: i32,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DemandResponse {
    pub stop_id: String,
    pub demand_score: f64,
    pub demand_level: String,
    pub peak_hour: bool,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RouteRequest {
    #[serde(default = "default_max_routes")]
    pub max_routes: i32,
    #[serde(default = "default_min_demand_threshold")]
    pub min_demand_threshold: f64,
}

impl Default for RouteRequest {
    fn default() -> Self {
        RouteRequest {
            max_routes: default_max_routes(),
            min_demand_threshold: default_min_demand_threshold(),
        }
    }
}

fn default_max_routes() -> i32 {
    5
}

fn default_min_demand_threshold() -> f64 {
    30.0
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RouteResponse {
    pub route_id: String,
    pub center_lat: f64,
    pub center_lon: f64,
    pub estimated_demand: f64,
    pub peak_hour: u8,
    pub coverage_stops: u32,
    pub priority_score: f64,
    pub viability: String,
}

impl RouteResponse {
    pub fn from_suggestion(suggestion: &RouteSuggestion) -> Self {
        let viability = match suggestion.estimated_demand {
            d if d >= 70.0 => "High Viability",
            d if d >= 40.0 => "Medium Viability",
            _ => "Low Viability",
        };

        RouteResponse {
            route_id: suggestion.suggested_id.clone(),
            center_lat: suggestion.center_lat,
            center_lon: suggestion.center_lon,
            estimated_demand: suggestion.estimated_demand,
            peak_hour: suggestion.peak_hour,
            coverage_stops: suggestion.coverage_stop_count,
            priority_score: suggestion.priority_score,
            viability: viability.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct StopsQuery {
    #[serde(default = "default_stop_limit")]
    pub limit: i64,
    #[serde(default)]
    pub include_demand: bool,
}

fn default_stop_limit() -> i64 {
    100
}

#[derive(Debug, Deserialize, Serialize)]
pub struct StopInfo {
    pub stop_id: String,
    pub stop_name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_demand: Option<f64>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct NearbyQuery {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_km: Option<f64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TripRequest {
    pub origin_lat: f64,
    pub origin_lon: f64,
    pub destination_lat: f64,
    pub destination_lon: f64,
    /// Defaults to the current local hour
    pub departure_hour: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HighDemandArea {
    pub stop_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub demand_score: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyticsResponse {
    pub total_stops: usize,
    pub total_routes: usize,
    pub avg_demand: f64,
    pub peak_hours: Vec<u8>,
    pub high_demand_areas: Vec<HighDemandArea>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GpsSubmissionResponse {
    pub status: String,
    pub message: String,
    pub total_records: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Local>,
    /// Whether each collaborator was loaded at startup
    pub services: BTreeMap<&'static str, bool>,
}
