use std::collections::BTreeMap;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Datelike, Local, Timelike};
use itertools::Itertools;
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use super::extract::{ApiJson, ApiQuery};
use super::state::SharedState;
use crate::analysis::geo::nearest_stops;
use crate::analysis::trip_planner::{TripQuery, plan_trip};
use crate::error::{ServiceError, ensure_range};
use crate::model::api_model::{
    AnalyticsResponse, DemandRequest, DemandResponse, GpsSubmissionResponse, HealthResponse,
    HighDemandArea, NearbyQuery, RouteRequest, RouteResponse, StopInfo, StopsQuery, TripRequest,
};
use crate::model::demand::is_rush_hour;
use crate::model::gps::GpsPing;
use crate::model::stop::NearestStopMatch;
use crate::model::trip::TripPlan;
use crate::utils::{mean, quantile, round_to};

type ApiResult<T> = Result<Json<T>, ServiceError>;

const DEFAULT_PEAK_HOURS: [u8; 2] = [8, 17];
const TOP_PEAK_HOURS: usize = 3;
const HIGH_DEMAND_QUANTILE: f64 = 0.8;
const MAX_HIGH_DEMAND_AREAS: usize = 5;
const MAX_NEARBY_RADIUS_KM: f64 = 50.0;

pub fn create_router(state: SharedState) -> Router {
    let api = Router::new()
        .route("/predict_demand", post(predict_demand))
        .route("/suggest_routes", post(suggest_routes))
        .route("/stops", get(list_stops))
        .route("/stops/nearby", get(nearby_stops))
        .route("/suggest_trip", post(suggest_trip))
        .route("/analytics", get(analytics))
        .route("/submit_gps", post(submit_gps))
        .route("/health", get(health));

    Router::new()
        .route("/", get(banner))
        .route("/health", get(liveness))
        .nest("/api/v1", api)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn banner() -> Json<Value> {
    Json(json!({ "message": "Transit demand API is running" }))
}

async fn liveness() -> Json<Value> {
    Json(json!({ "status": "healthy", "version": env!("CARGO_PKG_VERSION") }))
}

fn ensure_coordinates(latitude: f64, longitude: f64) -> Result<(), ServiceError> {
    ensure_range("latitude", latitude, -90.0, 90.0)?;
    ensure_range("longitude", longitude, -180.0, 180.0)?;
    Ok(())
}

#[tracing::instrument(skip(state))]
async fn predict_demand(
    State(state): State<SharedState>,
    ApiJson(request): ApiJson<DemandRequest>,
) -> ApiResult<DemandResponse> {
    let hour = ensure_range("hour", request.hour, 0, 23)? as u8;
    let day_of_week = ensure_range("day_of_week", request.day_of_week, 0, 6)? as u8;
    ensure_coordinates(request.latitude, request.longitude)?;

    let predictor = state
        .trained_predictor()
        .ok_or(ServiceError::ModelNotTrained)?;

    let demand_score = predictor.predict(
        &request.stop_id,
        hour,
        day_of_week,
        request.latitude,
        request.longitude,
    )?;

    let demand_level = match demand_score {
        s if s >= 75.0 => "Very High",
        s if s >= 50.0 => "High",
        s if s >= 25.0 => "Medium",
        _ => "Low",
    };

    let peak_hour = is_rush_hour(hour);

    let mut recommendations = vec![];
    if demand_score > 70.0 {
        recommendations.push("Consider increasing service frequency");
        if peak_hour {
            recommendations.push("Deploy additional vehicles during peak hours");
        }
    } else if demand_score < 30.0 {
        recommendations.push("Consider reducing service frequency");
        recommendations.push("Evaluate route viability");
    }
    if day_of_week >= 5 {
        recommendations.push("Weekend service pattern detected");
    }

    Ok(Json(DemandResponse {
        stop_id: request.stop_id,
        demand_score: round_to(demand_score, 1),
        demand_level: demand_level.to_string(),
        peak_hour,
        recommendations: recommendations.into_iter().map(String::from).collect(),
    }))
}

#[tracing::instrument(skip(state))]
async fn suggest_routes(
    State(state): State<SharedState>,
    ApiJson(request): ApiJson<RouteRequest>,
) -> ApiResult<Vec<RouteResponse>> {
    let max_routes = ensure_range("max_routes", request.max_routes, 1, 20)? as usize;
    let threshold = ensure_range(
        "min_demand_threshold",
        request.min_demand_threshold,
        0.0,
        100.0,
    )?;

    let suggestions = state.route_suggestions.as_ref().ok_or_else(|| {
        ServiceError::NotFound("Route suggestions not found. Run training first.".to_string())
    })?;

    let routes = suggestions
        .iter()
        .filter(|s| s.estimated_demand >= threshold)
        .take(max_routes)
        .map(RouteResponse::from_suggestion)
        .collect_vec();

    Ok(Json(routes))
}

#[tracing::instrument(skip(state))]
async fn list_stops(
    State(state): State<SharedState>,
    ApiQuery(query): ApiQuery<StopsQuery>,
) -> ApiResult<Vec<StopInfo>> {
    let limit = ensure_range("limit", query.limit, 1, 1000)? as usize;

    let stops = state
        .stops
        .as_ref()
        .ok_or(ServiceError::DataNotLoaded("Stops data"))?;

    let now = Local::now();
    let predictor = state
        .trained_predictor()
        .filter(|_| query.include_demand);

    let stops = stops
        .iter()
        .take(limit)
        .map(|stop| StopInfo {
            stop_id: stop.stop_id.clone(),
            stop_name: stop.stop_name.clone(),
            latitude: stop.latitude,
            longitude: stop.longitude,
            current_demand: predictor.and_then(|p| {
                p.predict(
                    &stop.stop_id,
                    now.hour() as u8,
                    now.weekday().num_days_from_monday() as u8,
                    stop.latitude,
                    stop.longitude,
                )
                .ok()
                .map(|d| round_to(d, 1))
            }),
        })
        .collect_vec();

    Ok(Json(stops))
}

#[tracing::instrument(skip(state))]
async fn nearby_stops(
    State(state): State<SharedState>,
    ApiQuery(query): ApiQuery<NearbyQuery>,
) -> ApiResult<Vec<NearestStopMatch>> {
    ensure_coordinates(query.latitude, query.longitude)?;
    let radius_km = ensure_range(
        "radius_km",
        query.radius_km.unwrap_or(state.max_walk_km),
        0.0,
        MAX_NEARBY_RADIUS_KM,
    )?;
    let limit = match query.limit {
        Some(limit) => ensure_range("limit", limit, 1, 1000)? as usize,
        None => state.nearby_limit,
    };

    let stops = state
        .stops
        .as_ref()
        .ok_or(ServiceError::DataNotLoaded("Stops data"))?;

    Ok(Json(nearest_stops(
        query.latitude,
        query.longitude,
        stops,
        radius_km,
        limit,
    )))
}

#[tracing::instrument(skip(state))]
async fn suggest_trip(
    State(state): State<SharedState>,
    ApiJson(request): ApiJson<TripRequest>,
) -> ApiResult<TripPlan> {
    ensure_coordinates(request.origin_lat, request.origin_lon)?;
    ensure_coordinates(request.destination_lat, request.destination_lon)?;
    let departure_hour = ensure_range(
        "departure_hour",
        request
            .departure_hour
            .unwrap_or_else(|| Local::now().hour() as i32),
        0,
        23,
    )? as u8;

    let stops = state
        .stops
        .as_ref()
        .ok_or(ServiceError::DataNotLoaded("Stops data"))?;
    let routes = state
        .routes
        .as_ref()
        .ok_or(ServiceError::DataNotLoaded("Routes data"))?;

    let query = TripQuery {
        origin: (request.origin_lat, request.origin_lon),
        destination: (request.destination_lat, request.destination_lon),
        departure_hour,
    };

    let plan = plan_trip(
        &query,
        stops,
        routes,
        state.estimator.as_ref(),
        state.max_walk_km,
        state.nearby_limit,
    )?;

    Ok(Json(plan))
}

#[tracing::instrument(skip(state))]
async fn analytics(State(state): State<SharedState>) -> ApiResult<AnalyticsResponse> {
    let mut response = AnalyticsResponse {
        total_stops: state.stops.as_ref().map_or(0, Vec::len),
        total_routes: state.routes.as_ref().map_or(0, Vec::len),
        avg_demand: 0.0,
        peak_hours: DEFAULT_PEAK_HOURS.to_vec(),
        high_demand_areas: vec![],
        recommendations: vec![],
    };

    if let Some(rows) = state.demand_features.as_ref().filter(|r| !r.is_empty()) {
        let scores = rows.iter().map(|r| r.demand_score).collect_vec();
        response.avg_demand = mean(&scores).unwrap_or(0.0);

        let mut by_hour: BTreeMap<u8, Vec<f64>> = BTreeMap::new();
        for row in rows {
            by_hour.entry(row.hour).or_default().push(row.demand_score);
        }
        // stable sort over ascending hours, equal means keep the earlier hour first
        response.peak_hours = by_hour
            .iter()
            .map(|(hour, scores)| (*hour, mean(scores).unwrap_or(0.0)))
            .sorted_by(|a, b| b.1.total_cmp(&a.1))
            .take(TOP_PEAK_HOURS)
            .map(|(hour, _)| hour)
            .collect();

        if let Some(threshold) = quantile(&scores, HIGH_DEMAND_QUANTILE) {
            response.high_demand_areas = rows
                .iter()
                .filter(|r| r.demand_score > threshold)
                .take(MAX_HIGH_DEMAND_AREAS)
                .map(|r| HighDemandArea {
                    stop_id: r.stop_id.clone(),
                    latitude: r.latitude,
                    longitude: r.longitude,
                    demand_score: round_to(r.demand_score, 1),
                })
                .collect();
        }
    }

    let mut recommendations = vec![
        "Focus on high-demand areas for service improvements",
        "Consider dynamic pricing during peak hours",
        "Optimize routes based on demand patterns",
    ];
    if response.avg_demand > 60.0 {
        recommendations.push("Overall high demand detected - consider fleet expansion");
    } else if response.avg_demand < 30.0 {
        recommendations.push("Low demand areas need route optimization");
    }
    response.recommendations = recommendations.into_iter().map(String::from).collect();

    Ok(Json(response))
}

#[tracing::instrument(skip(state, pings), fields(pings = pings.len()))]
async fn submit_gps(
    State(state): State<SharedState>,
    ApiJson(pings): ApiJson<Vec<GpsPing>>,
) -> ApiResult<GpsSubmissionResponse> {
    for ping in &pings {
        ensure_coordinates(ping.latitude, ping.longitude)?;
        ensure_range("occupancy", ping.occupancy, 0.0, 1.0)?;
    }

    let received = pings.len();
    let total_records = state.gps_log.submit(pings).await?;

    info!("Stored {received} GPS pings, {total_records} in the log");

    Ok(Json(GpsSubmissionResponse {
        status: "success".to_string(),
        message: format!("Received {received} GPS pings"),
        total_records,
    }))
}

async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let services = BTreeMap::from([
        ("demand_predictor", state.trained_predictor().is_some()),
        ("stops_data", state.stops.is_some()),
        ("routes_data", state.routes.is_some()),
        ("demand_features", state.demand_features.is_some()),
    ]);

    let status = if services.values().all(|&loaded| loaded) {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        timestamp: Local::now(),
        services,
    })
}
