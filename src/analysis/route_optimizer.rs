//! Stop clustering and new route suggestions from high demand areas.
use std::collections::{BTreeMap, HashMap};

use anyhow::bail;
use itertools::Itertools;
use rand::distributions::{Distribution, WeightedIndex};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::model::demand::DemandFeatureRow;
use crate::model::route_suggestion::RouteSuggestion;
use crate::model::stop::Stop;
use crate::utils::{mean, quantile};

const MAX_ITERATIONS: usize = 300;
const TOLERANCE: f64 = 1e-4;
/// Rows above this quantile of demand count as high demand
const HIGH_DEMAND_QUANTILE: f64 = 0.75;

/// Result of k-means over stop coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct StopClusters {
    /// (latitude, longitude) per cluster
    pub centers: Vec<(f64, f64)>,
    /// Cluster of each input stop, in input order
    pub assignments: Vec<usize>,
    pub inertia: f64,
    pub iterations: usize,
    by_stop_id: HashMap<String, usize>,
}

impl StopClusters {
    pub fn cluster_of(&self, stop_id: &str) -> Option<usize> {
        self.by_stop_id.get(stop_id).copied()
    }

    /// Nearest center to a coordinate, lowest index on ties.
    pub fn predict(&self, latitude: f64, longitude: f64) -> usize {
        nearest_center(&self.centers, (latitude, longitude)).0
    }

    pub fn len(&self) -> usize {
        self.centers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centers.is_empty()
    }
}

/// How high demand rows are grouped into route candidates.
#[derive(Copy, Clone, Debug)]
pub enum RouteGrouping<'a> {
    /// One candidate per spatial cluster. Rows of stops the clustering never saw
    /// join the cluster with the nearest center.
    ByCluster(&'a StopClusters),
    /// One candidate per stop
    ByStop,
}

impl RouteGrouping<'_> {
    fn key(&self, row: &DemandFeatureRow) -> String {
        match self {
            RouteGrouping::ByCluster(clusters) => clusters
                .cluster_of(&row.stop_id)
                .unwrap_or_else(|| clusters.predict(row.latitude, row.longitude))
                .to_string(),
            RouteGrouping::ByStop => row.stop_id.clone(),
        }
    }
}

/// Partitions stops into `n_clusters` groups with seeded k-means++ and Lloyd iterations.
///
/// `n_clusters` is clamped to the number of stops.
#[tracing::instrument(err, skip(stops), fields(stops = stops.len()))]
pub fn cluster_stops(stops: &[Stop], n_clusters: usize, seed: u64) -> anyhow::Result<StopClusters> {
    if stops.is_empty() {
        bail!("no stops to cluster");
    }
    if n_clusters == 0 {
        bail!("n_clusters must be at least 1");
    }

    let points = stops.iter().map(|s| (s.latitude, s.longitude)).collect_vec();
    let k = n_clusters.min(points.len());

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut centers = init_centers(&points, k, &mut rng);

    let tolerance = TOLERANCE * mean_variance(&points);
    let mut iterations = 0;

    while iterations < MAX_ITERATIONS {
        iterations += 1;

        let assignments = assign(&centers, &points);
        let updated = update_centers(&centers, &points, &assignments);

        let shift: f64 = centers
            .iter()
            .zip(&updated)
            .map(|(a, b)| squared_distance(*a, *b))
            .sum();

        centers = updated;

        if shift <= tolerance {
            break;
        }
    }

    let assignments = assign(&centers, &points);
    let inertia = points
        .iter()
        .zip(&assignments)
        .map(|(p, &c)| squared_distance(*p, centers[c]))
        .sum();

    let by_stop_id = stops
        .iter()
        .zip(&assignments)
        .map(|(s, &c)| (s.stop_id.clone(), c))
        .collect();

    info!("Stops clustered into {k} groups after {iterations} iterations");

    Ok(StopClusters {
        centers,
        assignments,
        inertia,
        iterations,
        by_stop_id,
    })
}

/// Ranks high demand areas as candidate routes.
///
/// Keeps rows strictly above the 75th percentile of demand, groups them, takes the
/// first `max_routes` groups in order of appearance and sorts them by priority,
/// highest first. Equal priorities keep their discovery order.
pub fn suggest_routes(
    rows: &[DemandFeatureRow],
    grouping: RouteGrouping<'_>,
    max_routes: usize,
) -> Vec<RouteSuggestion> {
    let scores = rows.iter().map(|r| r.demand_score).collect_vec();
    let Some(threshold) = quantile(&scores, HIGH_DEMAND_QUANTILE) else {
        return vec![];
    };

    let mut groups: Vec<(String, Vec<&DemandFeatureRow>)> = vec![];
    let mut positions: HashMap<String, usize> = HashMap::new();

    for row in rows.iter().filter(|r| r.demand_score > threshold) {
        let key = grouping.key(row);

        match positions.get(&key) {
            Some(&position) => groups[position].1.push(row),
            None if groups.len() < max_routes => {
                positions.insert(key.clone(), groups.len());
                groups.push((key, vec![row]));
            }
            None => {}
        }
    }

    let mut suggestions = groups
        .into_iter()
        .map(|(key, rows)| summarize_group(&key, &rows))
        .collect_vec();

    suggestions.sort_by(|a, b| b.priority_score.total_cmp(&a.priority_score));

    info!("Generated {} route suggestions", suggestions.len());

    suggestions
}

fn summarize_group(key: &str, rows: &[&DemandFeatureRow]) -> RouteSuggestion {
    let demand = rows.iter().map(|r| r.demand_score).collect_vec();
    let estimated_demand = mean(&demand).unwrap_or(0.0);

    let mut by_hour: BTreeMap<u8, (f64, usize)> = BTreeMap::new();
    for row in rows {
        let entry = by_hour.entry(row.hour).or_insert((0.0, 0));
        entry.0 += row.demand_score;
        entry.1 += 1;
    }

    // ascending hours with a strict comparison, so ties go to the earliest hour
    let mut peak_hour = 0;
    let mut peak_demand = f64::NEG_INFINITY;
    for (hour, (sum, count)) in by_hour {
        let hour_mean = sum / count as f64;
        if hour_mean > peak_demand {
            peak_demand = hour_mean;
            peak_hour = hour;
        }
    }

    let lats = rows.iter().map(|r| r.latitude).collect_vec();
    let lons = rows.iter().map(|r| r.longitude).collect_vec();

    RouteSuggestion {
        suggested_id: format!("new_route_{key}"),
        center_lat: mean(&lats).unwrap_or(0.0),
        center_lon: mean(&lons).unwrap_or(0.0),
        estimated_demand,
        peak_hour,
        coverage_stop_count: rows.len() as u32,
        priority_score: estimated_demand * rows.len() as f64,
    }
}

fn squared_distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    (a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)
}

fn nearest_center(centers: &[(f64, f64)], point: (f64, f64)) -> (usize, f64) {
    centers
        .iter()
        .enumerate()
        .map(|(i, c)| (i, squared_distance(*c, point)))
        .fold((0, f64::INFINITY), |best, candidate| {
            if candidate.1 < best.1 { candidate } else { best }
        })
}

fn assign(centers: &[(f64, f64)], points: &[(f64, f64)]) -> Vec<usize> {
    points.iter().map(|p| nearest_center(centers, *p).0).collect()
}

/// Mean of each cluster's points. A cluster that lost all points keeps its center.
fn update_centers(
    centers: &[(f64, f64)],
    points: &[(f64, f64)],
    assignments: &[usize],
) -> Vec<(f64, f64)> {
    let mut sums = vec![(0.0, 0.0, 0usize); centers.len()];

    for (p, &c) in points.iter().zip(assignments) {
        sums[c].0 += p.0;
        sums[c].1 += p.1;
        sums[c].2 += 1;
    }

    sums.into_iter()
        .zip(centers)
        .map(|((lat, lon, count), old)| {
            if count == 0 {
                *old
            } else {
                (lat / count as f64, lon / count as f64)
            }
        })
        .collect()
}

/// k-means++ seeding: each next center is drawn proportionally to its squared
/// distance from the closest center picked so far.
fn init_centers(points: &[(f64, f64)], k: usize, rng: &mut ChaCha8Rng) -> Vec<(f64, f64)> {
    let mut centers = vec![points[rng.gen_range(0..points.len())]];

    while centers.len() < k {
        let weights = points
            .iter()
            .map(|p| nearest_center(&centers, *p).1)
            .collect_vec();
        // all weights zero once every distinct point is a center
        let next = match WeightedIndex::new(&weights) {
            Ok(distances) => distances.sample(rng),
            Err(_) => rng.gen_range(0..points.len()),
        };

        centers.push(points[next]);
    }

    centers
}

fn mean_variance(points: &[(f64, f64)]) -> f64 {
    let n = points.len() as f64;
    let lat_mean = points.iter().map(|p| p.0).sum::<f64>() / n;
    let lon_mean = points.iter().map(|p| p.1).sum::<f64>() / n;

    let lat_var = points.iter().map(|p| (p.0 - lat_mean).powi(2)).sum::<f64>() / n;
    let lon_var = points.iter().map(|p| (p.1 - lon_mean).powi(2)).sum::<f64>() / n;

    (lat_var + lon_var) / 2.0
}
