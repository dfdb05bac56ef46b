use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::analysis::demand_predictor::DemandPredictor;
use crate::analysis::trip_planner::TravelEstimator;
use crate::background_services::gps_writer::GpsLogHandle;
use crate::config::DataPaths;
use crate::dal::{read_demand_features, read_route_suggestions, read_routes, read_stops};
use crate::model::demand::DemandFeatureRow;
use crate::model::route::Route;
use crate::model::route_suggestion::RouteSuggestion;
use crate::model::stop::Stop;

/// Everything the handlers read. Built once at startup and never mutated, so
/// handlers share it through an `Arc` without locking.
///
/// A collaborator that failed to load is `None` and the endpoints depending on it
/// answer 503 or 404 instead of the whole service refusing to start.
pub struct AppState {
    pub predictor: Option<DemandPredictor>,
    pub stops: Option<Vec<Stop>>,
    pub routes: Option<Vec<Route>>,
    pub demand_features: Option<Vec<DemandFeatureRow>>,
    pub route_suggestions: Option<Vec<RouteSuggestion>>,
    pub estimator: Arc<dyn TravelEstimator>,
    pub gps_log: GpsLogHandle,
    pub max_walk_km: f64,
    pub nearby_limit: usize,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Loads every artifact it can find, logging the ones it can't.
    pub fn load(
        paths: &DataPaths,
        model_path: &Path,
        estimator: Arc<dyn TravelEstimator>,
        gps_log: GpsLogHandle,
        max_walk_km: f64,
        nearby_limit: usize,
    ) -> Self {
        let predictor = loaded("demand predictor", DemandPredictor::load(model_path));
        let stops = loaded("stops", read_stops(&paths.gtfs_dir));
        let routes = loaded("routes", read_routes(&paths.gtfs_dir));
        let demand_features = loaded(
            "demand features",
            read_demand_features(&paths.demand_features),
        );
        let route_suggestions = loaded(
            "route suggestions",
            read_route_suggestions(&paths.route_suggestions),
        );

        AppState {
            predictor,
            stops,
            routes,
            demand_features,
            route_suggestions,
            estimator,
            gps_log,
            max_walk_km,
            nearby_limit,
        }
    }

    pub fn trained_predictor(&self) -> Option<&DemandPredictor> {
        self.predictor.as_ref().filter(|p| p.is_trained())
    }
}

fn loaded<T>(name: &str, result: anyhow::Result<T>) -> Option<T> {
    match result {
        Ok(value) => {
            info!("{name} loaded");
            Some(value)
        }
        Err(e) => {
            warn!("{name} not available: {e:#}");
            None
        }
    }
}
