//! Origin to destination suggestions over the known route table.
use itertools::Itertools;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::analysis::geo::{haversine_distance_km, nearest_stops};
use crate::error::ServiceError;
use crate::model::route::Route;
use crate::model::stop::Stop;
use crate::model::trip::{RouteOption, TimeBand, TripPlan};
use crate::utils::round_to;

/// Below this straight line distance walking is suggested instead
const SHORT_TRIP_KM: f64 = 2.0;
/// Matched stops further than this from the traveller get a walking warning
const LONG_WALK_KM: f64 = 0.8;
const MAX_ALTERNATIVES: usize = 3;

/// Source of travel time, cost and frequency for a route.
///
/// Swap the placeholder for a schedule backed implementation without touching the planner.
pub trait TravelEstimator: Send + Sync {
    fn estimate(&self, route: &Route, band: TimeBand) -> RouteOption;
}

/// Seeded pseudo-random figures in plausible ranges. Not derived from any timetable.
///
/// The same seed, route and time band always produce the same option.
#[derive(Clone, Debug)]
pub struct PlaceholderEstimator {
    seed: u64,
}

impl PlaceholderEstimator {
    pub fn new(seed: u64) -> Self {
        PlaceholderEstimator { seed }
    }
}

impl TravelEstimator for PlaceholderEstimator {
    fn estimate(&self, route: &Route, band: TimeBand) -> RouteOption {
        let band_tag = match band {
            TimeBand::Peak => 0,
            TimeBand::OffPeak => 1,
            TimeBand::Night => 2,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        rng.set_stream(fnv1a(route.route_id.bytes().chain([band_tag])));

        let frequency_minutes = match band {
            TimeBand::Peak => rng.gen_range(5..=10),
            TimeBand::OffPeak => rng.gen_range(10..=20),
            TimeBand::Night => rng.gen_range(20..=30),
        };

        RouteOption {
            route_id: route.route_id.clone(),
            route_name: route.short_name.clone(),
            estimated_travel_minutes: rng.gen_range(15..=60),
            estimated_cost: round_to(rng.gen_range(1.5..=4.0), 2),
            frequency_minutes,
            time_band: band,
        }
    }
}

/// 64-bit FNV-1a, fixed across platforms and toolchains
fn fnv1a(bytes: impl IntoIterator<Item = u8>) -> u64 {
    bytes.into_iter().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

pub struct TripQuery {
    pub origin: (f64, f64),
    pub destination: (f64, f64),
    pub departure_hour: u8,
}

/// Matches both ends to nearby stops and picks the quickest route option.
pub fn plan_trip(
    query: &TripQuery,
    stops: &[Stop],
    routes: &[Route],
    estimator: &dyn TravelEstimator,
    max_walk_km: f64,
    stop_limit: usize,
) -> Result<TripPlan, ServiceError> {
    let (origin_lat, origin_lon) = query.origin;
    let (destination_lat, destination_lon) = query.destination;

    let origin_stops = nearest_stops(origin_lat, origin_lon, stops, max_walk_km, stop_limit);
    if origin_stops.is_empty() {
        return Err(ServiceError::NotFound(format!(
            "No stops found within {max_walk_km} km of the origin"
        )));
    }

    let destination_stops = nearest_stops(
        destination_lat,
        destination_lon,
        stops,
        max_walk_km,
        stop_limit,
    );
    if destination_stops.is_empty() {
        return Err(ServiceError::NotFound(format!(
            "No stops found within {max_walk_km} km of the destination"
        )));
    }

    let band = TimeBand::from_hour(query.departure_hour);
    let mut options = routes
        .iter()
        .map(|route| estimator.estimate(route, band))
        .sorted_by_key(|option| option.estimated_travel_minutes)
        .collect_vec();

    if options.is_empty() {
        return Err(ServiceError::NotFound("No routes available".to_string()));
    }

    let fastest_route = options.remove(0);
    options.truncate(MAX_ALTERNATIVES);

    // both lists are sorted, closest first
    let walking_time_minutes =
        origin_stops[0].walking_time_minutes + destination_stops[0].walking_time_minutes;

    let total_distance_km = haversine_distance_km(
        origin_lat,
        origin_lon,
        destination_lat,
        destination_lon,
    );

    let mut recommendations = vec![];
    if total_distance_km < SHORT_TRIP_KM {
        recommendations.push("Short distance - consider walking".to_string());
    }
    if origin_stops
        .iter()
        .chain(&destination_stops)
        .any(|m| m.distance_km > LONG_WALK_KM)
    {
        recommendations.push("Significant walking required to reach stops".to_string());
    }
    if band == TimeBand::Peak {
        recommendations.push("Peak hour travel - expect crowded vehicles".to_string());
    }

    Ok(TripPlan {
        total_time_minutes: fastest_route.estimated_travel_minutes + walking_time_minutes,
        total_cost: fastest_route.estimated_cost,
        fastest_route,
        alternatives: options,
        total_distance_km: round_to(total_distance_km, 2),
        walking_time_minutes,
        origin_stops,
        destination_stops,
        recommendations,
    })
}
