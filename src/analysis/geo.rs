//! Great-circle distances and nearest stop lookup.
use itertools::Itertools;

use crate::model::stop::{NearestStopMatch, Stop};

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Walking pace assumed when turning a distance into minutes.
pub const WALKING_MINUTES_PER_KM: f64 = 12.0;

/// Haversine distance between two points given in decimal degrees.
pub fn haversine_distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lon1, lat2, lon2) = (
        lat1.to_radians(),
        lon1.to_radians(),
        lat2.to_radians(),
        lon2.to_radians(),
    );

    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    // rounding can push `a` a hair above 1 for antipodal points
    let c = 2.0 * a.clamp(0.0, 1.0).sqrt().asin();

    EARTH_RADIUS_KM * c
}

pub fn walking_time_minutes(distance_km: f64) -> u32 {
    (distance_km * WALKING_MINUTES_PER_KM).round() as u32
}

/// Stops within `max_distance_km` of the point, closest first, at most `limit` of them.
///
/// An empty result is not an error here, the caller decides what "nothing nearby" means.
pub fn nearest_stops<'a, I>(
    lat: f64,
    lon: f64,
    stops: I,
    max_distance_km: f64,
    limit: usize,
) -> Vec<NearestStopMatch>
where
    I: IntoIterator<Item = &'a Stop>,
{
    stops
        .into_iter()
        .map(|stop| {
            (
                stop,
                haversine_distance_km(lat, lon, stop.latitude, stop.longitude),
            )
        })
        .filter(|(_, distance_km)| *distance_km <= max_distance_km)
        // stable, equally distant stops keep table order
        .sorted_by(|a, b| a.1.total_cmp(&b.1))
        .take(limit)
        .map(|(stop, distance_km)| NearestStopMatch {
            stop: stop.clone(),
            distance_km,
            walking_time_minutes: walking_time_minutes(distance_km),
        })
        .collect_vec()
}
