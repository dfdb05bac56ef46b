//! Offline batch job: feature store, demand model and route suggestions in one pass.
use std::path::{Path, PathBuf};

use anyhow::{Context, Error, bail};
use tracing::{info, info_span, warn};

use super::feature_builder::{create_demand_features, generate_synthetic_gps};
use crate::analysis::demand_predictor::{DemandPredictor, TrainingReport};
use crate::analysis::random_forest::ForestParams;
use crate::analysis::route_optimizer::{RouteGrouping, cluster_stops, suggest_routes};
use crate::config::{DataPaths, GroupingMode};
use crate::dal::{
    read_routes, read_stop_times, read_stops, read_trip_routes, write_demand_features,
    write_demand_map, write_route_suggestions, write_synthetic_gps,
};

/// Central Accra, the sample prediction logged after training
const SAMPLE_POSITION: (f64, f64) = (5.6037, -0.1870);

#[derive(Debug, Clone)]
pub struct TrainingOptions {
    pub num_days: u32,
    pub n_clusters: usize,
    pub max_routes: usize,
    pub forest: ForestParams,
    pub seed: u64,
    pub grouping: GroupingMode,
    pub map_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub stops: usize,
    pub routes: usize,
    pub pings: usize,
    pub feature_rows: usize,
    pub report: TrainingReport,
    pub clusters: usize,
    pub suggestions: usize,
}

/// Runs the whole pipeline against the GTFS feed under `paths` and writes every artifact.
#[tracing::instrument(err, skip(paths, options))]
pub fn run_training(
    paths: &DataPaths,
    model_path: &Path,
    options: &TrainingOptions,
) -> Result<TrainingSummary, Error> {
    info!("Starting model training pipeline");

    let stops = read_stops(&paths.gtfs_dir).context("loading GTFS stops")?;
    let routes = read_routes(&paths.gtfs_dir).context("loading GTFS routes")?;
    let stop_times = read_stop_times(&paths.gtfs_dir).context("loading GTFS stop times")?;
    let trip_routes = read_trip_routes(&paths.gtfs_dir)?;

    let (pings, features) = {
        let _span = info_span!("Building features").entered();

        let pings = generate_synthetic_gps(
            &stop_times,
            &stops,
            &trip_routes,
            options.num_days,
            options.seed,
        )?;
        let features = create_demand_features(&pings);

        write_demand_features(&paths.demand_features, &features)?;
        write_synthetic_gps(&paths.synthetic_gps, &pings)?;

        (pings, features)
    };

    if features.is_empty() {
        bail!("no demand features, do the stop times reference any known stop?");
    }

    write_demand_map(&options.map_path, &stops, &pings)?;

    let mut predictor = DemandPredictor::new(options.forest);
    let report = predictor.train(&features)?;
    predictor.save(model_path)?;

    let (lat, lon) = SAMPLE_POSITION;
    match predictor.predict("sample", 8, 1, lat, lon) {
        Ok(score) => info!("Sample prediction for Tuesday 08:00: {score:.1}"),
        Err(e) => warn!("Sample prediction failed: {e}"),
    }

    let clusters = cluster_stops(&stops, options.n_clusters, options.seed)?;
    info!(
        "{} stops in {} clusters, inertia {:.6} after {} iterations",
        clusters.assignments.len(),
        clusters.len(),
        clusters.inertia,
        clusters.iterations
    );
    let grouping = match options.grouping {
        GroupingMode::Cluster => RouteGrouping::ByCluster(&clusters),
        GroupingMode::Stop => RouteGrouping::ByStop,
    };

    let suggestions = suggest_routes(&features, grouping, options.max_routes);
    write_route_suggestions(&paths.route_suggestions, &suggestions)?;

    let summary = TrainingSummary {
        stops: stops.len(),
        routes: routes.len(),
        pings: pings.len(),
        feature_rows: features.len(),
        report,
        clusters: clusters.len(),
        suggestions: suggestions.len(),
    };

    Ok(summary)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::fs;
    use std::path::PathBuf;

    use super::*;
    use crate::dal::{read_demand_features, read_route_suggestions};

    /// Writes a small four stop feed with two routes and returns its data directory.
    pub(crate) fn write_sample_feed(name: &str) -> anyhow::Result<PathBuf> {
        let data_dir = std::env::temp_dir().join(format!(
            "transit_demand_{}_{}",
            std::process::id(),
            name
        ));
        let gtfs_dir = data_dir.join("gtfs");
        fs::create_dir_all(&gtfs_dir)?;

        fs::write(
            gtfs_dir.join("stops.txt"),
            "stop_id,stop_name,stop_lat,stop_lon,zone_id\n\
             S1,Circle,5.5700,-0.2100,\n\
             S2,Kaneshie,5.5650,-0.2350,\n\
             S3,Madina,5.6800,-0.1650,\n\
             S4,,5.6750,-0.1700,\n",
        )?;
        fs::write(
            gtfs_dir.join("routes.txt"),
            "route_id,agency_id,route_short_name,route_long_name,route_type\n\
             R1,A,1,Circle - Kaneshie,3\n\
             R2,A,2,Madina Loop,3\n",
        )?;
        fs::write(
            gtfs_dir.join("trips.txt"),
            "route_id,service_id,trip_id\nR1,WK,T1\nR2,WK,T2\n",
        )?;

        let mut stop_times = "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n".to_string();
        for i in 0..6 {
            stop_times += &format!("T1,06:{i:02}:00,06:{i:02}:00,S1,{}\n", i * 2);
            stop_times += &format!("T1,06:{i:02}:30,06:{i:02}:30,S2,{}\n", i * 2 + 1);
            stop_times += &format!("T2,07:{i:02}:00,07:{i:02}:00,S3,{}\n", i * 2);
            stop_times += &format!("T2,07:{i:02}:30,07:{i:02}:30,S4,{}\n", i * 2 + 1);
        }
        fs::write(gtfs_dir.join("stop_times.txt"), stop_times)?;

        Ok(data_dir)
    }

    #[test]
    fn test_pipeline_writes_every_artifact() -> anyhow::Result<()> {
        let data_dir = write_sample_feed("pipeline")?;
        let paths = DataPaths::new(&data_dir);
        let model_path = data_dir.join("models").join("demand_predictor.json");

        let options = TrainingOptions {
            num_days: 7,
            n_clusters: 2,
            max_routes: 3,
            forest: ForestParams {
                n_estimators: 5,
                ..ForestParams::default()
            },
            seed: 42,
            grouping: GroupingMode::Cluster,
            map_path: data_dir.join("docs").join("transit_map.html"),
        };

        let summary = run_training(&paths, &model_path, &options)?;

        assert_eq!(summary.stops, 4);
        assert_eq!(summary.routes, 2);
        // 24 stop visits per day
        assert_eq!(summary.pings, 7 * 24);
        assert_eq!(summary.clusters, 2);
        assert!(summary.suggestions <= 3);

        assert_eq!(read_demand_features(&paths.demand_features)?.len(), summary.feature_rows);
        assert!(paths.synthetic_gps.exists());
        let map = fs::read_to_string(&options.map_path)?;
        for id in ["S1", "S2", "S3", "S4"] {
            assert!(map.contains(&format!(r#""id":"{id}""#)));
        }
        assert_eq!(
            read_route_suggestions(&paths.route_suggestions)?.len(),
            summary.suggestions
        );

        let predictor = DemandPredictor::load(&model_path)?;
        assert!(predictor.is_trained());
        let score = predictor.predict("S1", 8, 1, 5.57, -0.21)?;
        assert!((0.0..=100.0).contains(&score));

        fs::remove_dir_all(&data_dir)?;

        Ok(())
    }

    #[test]
    fn test_missing_feed_fails() {
        let paths = DataPaths::new(Path::new("/nonexistent/transit_demand"));
        let options = TrainingOptions {
            num_days: 1,
            n_clusters: 1,
            max_routes: 1,
            forest: ForestParams::default(),
            seed: 1,
            grouping: GroupingMode::Stop,
            map_path: PathBuf::from("/nonexistent/transit_map.html"),
        };

        let err = run_training(&paths, Path::new("/nonexistent/model.json"), &options).unwrap_err();
        assert!(format!("{err:#}").contains("stops"));
    }
}
