//! Builds the demand feature store from the static feed.
use std::collections::{BTreeMap, HashMap};
use std::f64::consts::PI;

use anyhow::{Context, Error};
use chrono::{Datelike, Duration, NaiveDate, Timelike};
use itertools::Itertools;
use rand::distributions::{Distribution, WeightedIndex};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::model::demand::DemandFeatureRow;
use crate::model::gps::SyntheticPing;
use crate::model::gtfs_model::GtfsStopTime;
use crate::model::stop::Stop;

const PINGS_PER_DAY: usize = 1000;
/// Standard deviation of the coordinate jitter in degrees, roughly 100 m
const POSITION_NOISE_DEG: f64 = 0.001;
const OCCUPANCY_LEVELS: [(f64, f64); 4] = [(0.2, 0.3), (0.5, 0.4), (0.8, 0.2), (1.0, 0.1)];
const FIRST_SERVICE_HOUR: f64 = 5.0;
const LAST_SERVICE_HOUR: f64 = 22.0;

/// Samples stop visits from the timetable and turns them into noisy GPS pings.
///
/// Each day draws `min(1000, stop visits)` visits with replacement. Visits of stops
/// missing from the stop table are dropped.
#[tracing::instrument(err, skip(stop_times, stops, trip_routes))]
pub fn generate_synthetic_gps(
    stop_times: &[GtfsStopTime],
    stops: &[Stop],
    trip_routes: &HashMap<String, String>,
    num_days: u32,
    seed: u64,
) -> Result<Vec<SyntheticPing>, Error> {
    let stops_by_id: HashMap<&str, &Stop> = stops.iter().map(|s| (s.stop_id.as_str(), s)).collect();

    let visits = stop_times
        .iter()
        .filter_map(|st| {
            let stop = stops_by_id.get(st.stop_id.as_str())?;
            let route_id = trip_routes
                .get(&st.trip_id)
                .map(String::as_str)
                .unwrap_or("unknown");
            Some((*stop, route_id))
        })
        .collect_vec();

    if visits.is_empty() {
        info!("no stop visits to sample from");
        return Ok(vec![]);
    }

    let base_date = NaiveDate::from_ymd_opt(2016, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .context("invalid base date")?;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let occupancy = occupancy_distribution()?;
    let per_day = PINGS_PER_DAY.min(visits.len());

    let mut pings = Vec::with_capacity(per_day * num_days as usize);

    for day in 0..num_days {
        let date = base_date + Duration::days(day.into());

        for _ in 0..per_day {
            let (stop, route_id) = visits[rng.gen_range(0..visits.len())];

            let hours = rng.gen_range(FIRST_SERVICE_HOUR..LAST_SERVICE_HOUR);
            let minutes = rng.gen_range(0.0..59.0);
            let offset_ms = (hours * 3_600_000.0 + minutes * 60_000.0) as i64;
            let timestamp = date + Duration::milliseconds(offset_ms);

            pings.push(SyntheticPing {
                timestamp,
                latitude: stop.latitude + normal_sample(&mut rng) * POSITION_NOISE_DEG,
                longitude: stop.longitude + normal_sample(&mut rng) * POSITION_NOISE_DEG,
                stop_id: stop.stop_id.clone(),
                route_id: route_id.to_string(),
                occupancy: OCCUPANCY_LEVELS[occupancy.sample(&mut rng)].0,
                hour: timestamp.hour() as u8,
                day_of_week: timestamp.weekday().num_days_from_monday() as u8,
            });
        }
    }

    info!("Generated {} synthetic GPS pings", pings.len());

    Ok(pings)
}

/// One row per (stop, hour, day of week), in key order.
pub fn create_demand_features(pings: &[SyntheticPing]) -> Vec<DemandFeatureRow> {
    struct Bucket {
        occupancy_sum: f64,
        count: u32,
        latitude: f64,
        longitude: f64,
    }

    let mut buckets: BTreeMap<(&str, u8, u8), Bucket> = BTreeMap::new();

    for ping in pings {
        let bucket = buckets
            .entry((ping.stop_id.as_str(), ping.hour, ping.day_of_week))
            .or_insert(Bucket {
                occupancy_sum: 0.0,
                count: 0,
                // position of the first ping seen for the bucket
                latitude: ping.latitude,
                longitude: ping.longitude,
            });
        bucket.occupancy_sum += ping.occupancy;
        bucket.count += 1;
    }

    let rows = buckets
        .into_iter()
        .map(|((stop_id, hour, day_of_week), b)| {
            DemandFeatureRow::aggregate(
                stop_id.to_string(),
                hour,
                day_of_week,
                b.occupancy_sum / b.count as f64,
                b.count,
                b.latitude,
                b.longitude,
            )
        })
        .collect_vec();

    info!("Created {} demand feature rows", rows.len());

    rows
}

/// Standard normal via Box-Muller
fn normal_sample(rng: &mut ChaCha8Rng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);

    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

fn occupancy_distribution() -> Result<WeightedIndex<f64>, Error> {
    WeightedIndex::new(OCCUPANCY_LEVELS.map(|(_, probability)| probability))
        .context("invalid occupancy weights")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn stop(id: &str, latitude: f64, longitude: f64) -> Stop {
        Stop {
            stop_id: id.to_string(),
            stop_name: id.to_string(),
            latitude,
            longitude,
        }
    }

    fn stop_time(trip_id: &str, stop_id: &str) -> GtfsStopTime {
        GtfsStopTime {
            trip_id: trip_id.to_string(),
            stop_id: stop_id.to_string(),
        }
    }

    fn ping(stop_id: &str, timestamp: &str, occupancy: f64, lat: f64) -> SyntheticPing {
        let timestamp = NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%d %H:%M").unwrap();
        SyntheticPing {
            timestamp,
            latitude: lat,
            longitude: -0.2,
            stop_id: stop_id.to_string(),
            route_id: "r".to_string(),
            occupancy,
            hour: timestamp.hour() as u8,
            day_of_week: timestamp.weekday().num_days_from_monday() as u8,
        }
    }

    #[test]
    fn test_synthetic_gps_shape() -> anyhow::Result<()> {
        let stops = vec![stop("a", 5.6, -0.18), stop("b", 5.7, -0.25)];
        let stop_times = vec![
            stop_time("t1", "a"),
            stop_time("t1", "b"),
            stop_time("t2", "missing"),
        ];
        let trip_routes = HashMap::from([("t1".to_string(), "r1".to_string())]);

        let pings = generate_synthetic_gps(&stop_times, &stops, &trip_routes, 3, 42)?;

        // two usable visits per day
        assert_eq!(pings.len(), 6);
        for p in &pings {
            assert!(p.stop_id == "a" || p.stop_id == "b");
            assert_eq!(p.route_id, "r1");
            assert!((5..=23).contains(&p.hour));
            assert!([0.2, 0.5, 0.8, 1.0].contains(&p.occupancy));
            let origin = if p.stop_id == "a" { &stops[0] } else { &stops[1] };
            assert!((p.latitude - origin.latitude).abs() < 0.01);
        }

        // 2016-01-01 was a Friday
        assert_eq!(pings[0].day_of_week, 4);
        assert_eq!(pings[0].timestamp.date(), NaiveDate::from_ymd_opt(2016, 1, 1).unwrap());
        assert_eq!(pings[5].timestamp.date(), NaiveDate::from_ymd_opt(2016, 1, 3).unwrap());

        Ok(())
    }

    #[test]
    fn test_synthetic_gps_is_seeded() -> anyhow::Result<()> {
        let stops = vec![stop("a", 5.6, -0.18), stop("b", 5.7, -0.25)];
        let stop_times = vec![stop_time("t1", "a"), stop_time("t1", "b")];
        let trip_routes = HashMap::new();

        let first = generate_synthetic_gps(&stop_times, &stops, &trip_routes, 2, 7)?;
        let second = generate_synthetic_gps(&stop_times, &stops, &trip_routes, 2, 7)?;

        assert_eq!(first, second);
        assert!(first.iter().all(|p| p.route_id == "unknown"));

        Ok(())
    }

    #[test]
    fn test_no_visits_gives_no_pings() -> anyhow::Result<()> {
        let pings = generate_synthetic_gps(&[], &[stop("a", 5.6, -0.18)], &HashMap::new(), 30, 42)?;

        assert!(pings.is_empty());

        Ok(())
    }

    #[test]
    fn test_create_demand_features_aggregates_buckets() {
        let pings = vec![
            ping("b", "2016-01-04 08:10", 0.5, 5.61),
            ping("a", "2016-01-04 08:20", 0.2, 5.60),
            ping("a", "2016-01-04 08:40", 1.0, 5.65),
            ping("a", "2016-01-09 13:00", 0.8, 5.60),
        ];

        let rows = create_demand_features(&pings);

        assert_eq!(rows.len(), 3);

        // sorted by stop, hour, day
        assert_eq!((rows[0].stop_id.as_str(), rows[0].hour, rows[0].day_of_week), ("a", 8, 0));
        assert!((rows[0].avg_occupancy - 0.6).abs() < 1e-9);
        assert_eq!(rows[0].trip_count, 2);
        assert_eq!(rows[0].latitude, 5.60);
        assert!((rows[0].demand_score - 24.0).abs() < 1e-9);
        assert!(rows[0].is_rush_hour);
        assert!(!rows[0].is_weekend);

        assert_eq!((rows[1].stop_id.as_str(), rows[1].hour, rows[1].day_of_week), ("a", 13, 5));
        assert!(rows[1].is_weekend);
        assert!(!rows[1].is_rush_hour);

        assert_eq!(rows[2].stop_id, "b");
    }

    #[test]
    fn test_occupancy_distribution() -> anyhow::Result<()> {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let occupancy = occupancy_distribution()?;
        let draws = (0..10_000)
            .map(|_| OCCUPANCY_LEVELS[occupancy.sample(&mut rng)].0)
            .collect_vec();

        let share = |level: f64| draws.iter().filter(|&&d| d == level).count() as f64 / 10_000.0;
        assert!((share(0.2) - 0.3).abs() < 0.03);
        assert!((share(0.5) - 0.4).abs() < 0.03);
        assert!((share(0.8) - 0.2).abs() < 0.03);
        assert!((share(1.0) - 0.1).abs() < 0.03);

        Ok(())
    }
}
