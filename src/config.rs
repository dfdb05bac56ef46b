//! Command line and environment configuration.
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::analysis::random_forest::ForestParams;
use crate::background_services::training::TrainingOptions;

/// Transit demand prediction and route suggestion service
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// root of the GTFS feed and the processed outputs
    #[arg(long, env = "DATA_DIR", default_value = "data", global = true)]
    pub data_dir: PathBuf,

    /// trained demand model artifact
    #[arg(
        long,
        env = "MODEL_PATH",
        default_value = "models/demand_predictor.json",
        global = true
    )]
    pub model_path: PathBuf,

    /// directory of the daily rolling log files
    #[arg(long, env = "LOG_DIR", default_value = "./logs", global = true)]
    pub log_dir: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// serve the HTTP API
    Serve(ServeArgs),
    /// generate features, train the demand model and write route suggestions
    Train(TrainArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8000")]
    pub bind: SocketAddr,

    /// how far a traveller is expected to walk to a stop
    #[arg(long, env = "MAX_WALK_KM", default_value_t = 1.0)]
    pub max_walk_km: f64,

    /// stops matched at each end of a trip, and the default of the nearby stops query
    #[arg(long, env = "NEARBY_LIMIT", default_value_t = 5)]
    pub nearby_limit: usize,

    /// seed of the placeholder travel time estimates
    #[arg(long, default_value_t = 42)]
    pub estimator_seed: u64,
}

#[derive(Args, Debug, Clone)]
pub struct TrainArgs {
    /// GTFS feed directory, defaults to <data-dir>/gtfs
    #[arg(long)]
    pub gtfs_dir: Option<PathBuf>,

    /// days of synthetic GPS pings to generate
    #[arg(long, default_value_t = 30)]
    pub num_days: u32,

    #[arg(long, default_value_t = 15)]
    pub n_clusters: usize,

    #[arg(long, default_value_t = 5)]
    pub max_routes: usize,

    #[arg(long, default_value_t = 100)]
    pub n_estimators: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    #[arg(long, value_enum, default_value_t = GroupingMode::Cluster)]
    pub grouping: GroupingMode,

    /// HTML map of the stops and the synthetic occupancy
    #[arg(long, default_value = "docs/transit_map.html")]
    pub map_path: PathBuf,
}

/// Key high demand rows are grouped by when suggesting routes
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum GroupingMode {
    Cluster,
    Stop,
}

impl TrainArgs {
    pub fn training_options(&self) -> TrainingOptions {
        TrainingOptions {
            num_days: self.num_days,
            n_clusters: self.n_clusters,
            max_routes: self.max_routes,
            forest: ForestParams {
                n_estimators: self.n_estimators,
                seed: self.seed,
                ..ForestParams::default()
            },
            seed: self.seed,
            grouping: self.grouping,
            map_path: self.map_path.clone(),
        }
    }
}

/// Where every input and output file lives under the data directory.
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub gtfs_dir: PathBuf,
    pub demand_features: PathBuf,
    pub synthetic_gps: PathBuf,
    pub route_suggestions: PathBuf,
    pub realtime_gps: PathBuf,
}

impl DataPaths {
    pub fn new(data_dir: &Path) -> Self {
        let processed = data_dir.join("processed");

        DataPaths {
            gtfs_dir: data_dir.join("gtfs"),
            demand_features: processed.join("demand_features.csv"),
            synthetic_gps: processed.join("synthetic_gps.csv"),
            route_suggestions: processed.join("route_suggestions.json"),
            realtime_gps: processed.join("realtime_gps.csv"),
        }
    }

    pub fn with_gtfs_dir(mut self, gtfs_dir: Option<PathBuf>) -> Self {
        if let Some(dir) = gtfs_dir {
            self.gtfs_dir = dir;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_train_defaults() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from(["transit_demand", "train"])?;

        assert_eq!(cli.data_dir, PathBuf::from("data"));
        assert_eq!(cli.model_path, PathBuf::from("models/demand_predictor.json"));

        let Command::Train(args) = cli.command else {
            panic!("expected the train command");
        };
        let options = args.training_options();
        assert_eq!(options.num_days, 30);
        assert_eq!(options.n_clusters, 15);
        assert_eq!(options.max_routes, 5);
        assert_eq!(options.forest.n_estimators, 100);
        assert_eq!(options.grouping, GroupingMode::Cluster);
        assert_eq!(options.map_path, PathBuf::from("docs/transit_map.html"));

        Ok(())
    }

    #[test]
    fn test_serve_options() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from([
            "transit_demand",
            "serve",
            "--bind",
            "127.0.0.1:9000",
            "--max-walk-km",
            "0.5",
            "--data-dir",
            "/tmp/transit",
        ])?;

        assert_eq!(cli.data_dir, PathBuf::from("/tmp/transit"));
        let Command::Serve(args) = cli.command else {
            panic!("expected the serve command");
        };
        assert_eq!(args.bind.port(), 9000);
        assert_eq!(args.max_walk_km, 0.5);
        assert_eq!(args.nearby_limit, 5);

        Ok(())
    }

    #[test]
    fn test_grouping_parses_stop() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from(["transit_demand", "train", "--grouping", "stop"])?;
        let Command::Train(args) = cli.command else {
            panic!("expected the train command");
        };
        assert_eq!(args.grouping, GroupingMode::Stop);

        Ok(())
    }

    #[test]
    fn test_data_paths_layout() {
        let paths = DataPaths::new(Path::new("data")).with_gtfs_dir(Some(PathBuf::from("feed")));

        assert_eq!(paths.gtfs_dir, PathBuf::from("feed"));
        assert_eq!(
            paths.route_suggestions,
            PathBuf::from("data/processed/route_suggestions.json")
        );
        assert_eq!(paths.realtime_gps, PathBuf::from("data/processed/realtime_gps.csv"));
    }
}
