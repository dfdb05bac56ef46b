//! Hourly demand regression over per-stop feature rows.
use std::fs;
use std::path::Path;

use anyhow::{Context, bail};
use itertools::Itertools;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::analysis::random_forest::{ForestParams, RandomForestRegressor};
use crate::analysis::scaler::StandardScaler;
use crate::error::ServiceError;
use crate::model::demand::{DemandFeatureRow, clip_demand, is_rush_hour, is_weekend};

pub const FEATURE_COUNT: usize = 8;

/// hour, day_of_week, is_weekend, is_rush_hour, latitude, longitude, avg_occupancy, trip_count
pub type FeatureVector = [f64; FEATURE_COUNT];

/// Occupancy assumed for a stop we have no observations for
const DEFAULT_OCCUPANCY: f64 = 0.5;
/// Trip count assumed for a stop we have no observations for
const DEFAULT_TRIP_COUNT: f64 = 10.0;

const TEST_FRACTION: f64 = 0.2;

#[derive(Clone, Debug, PartialEq)]
struct FittedModel {
    model: RandomForestRegressor,
    scaler: StandardScaler,
}

/// What gets written to disk. Loading restores all of it or nothing.
#[derive(Serialize, Deserialize)]
struct ModelArtifact {
    model: RandomForestRegressor,
    scaler: StandardScaler,
    is_trained: bool,
}

/// Holdout metrics of a training run
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct TrainingReport {
    pub mae: f64,
    pub rmse: f64,
    pub r2: f64,
    pub train_rows: usize,
    pub test_rows: usize,
}

#[derive(Clone, Debug)]
pub struct DemandPredictor {
    params: ForestParams,
    fitted: Option<FittedModel>,
}

impl DemandPredictor {
    pub fn new(params: ForestParams) -> Self {
        DemandPredictor {
            params,
            fitted: None,
        }
    }

    pub fn is_trained(&self) -> bool {
        self.fitted.is_some()
    }

    /// Fits scaler and forest on an 80/20 shuffled split and evaluates on the holdout.
    #[tracing::instrument(err, skip(self, rows), fields(rows = rows.len()))]
    pub fn train(&mut self, rows: &[DemandFeatureRow]) -> anyhow::Result<TrainingReport> {
        if rows.len() < 2 {
            bail!("need at least 2 feature rows to train, got {}", rows.len());
        }

        let x = rows.iter().map(feature_vector).collect_vec();
        let y = rows.iter().map(|r| r.demand_score).collect_vec();

        let mut order = (0..rows.len()).collect_vec();
        order.shuffle(&mut ChaCha8Rng::seed_from_u64(self.params.seed));

        let test_rows = ((rows.len() as f64 * TEST_FRACTION).ceil() as usize).clamp(1, rows.len() - 1);
        let (test_idx, train_idx) = order.split_at(test_rows);

        let x_train = train_idx.iter().map(|&i| x[i]).collect_vec();
        let y_train = train_idx.iter().map(|&i| y[i]).collect_vec();

        let scaler = StandardScaler::fit(&x_train);
        let x_train_scaled = scaler.transform_all(&x_train);

        let model = RandomForestRegressor::fit(self.params, &x_train_scaled, &y_train);

        let (truth, predicted): (Vec<f64>, Vec<f64>) = test_idx
            .iter()
            .map(|&i| (y[i], model.predict(&scaler.transform(&x[i]))))
            .unzip();

        let report = TrainingReport {
            mae: mean_absolute_error(&truth, &predicted),
            rmse: mean_squared_error(&truth, &predicted).sqrt(),
            r2: r2_score(&truth, &predicted),
            train_rows: train_idx.len(),
            test_rows: test_idx.len(),
        };

        info!(
            "Model performance: MAE {:.2}, RMSE {:.2}, R² {:.3}",
            report.mae, report.rmse, report.r2
        );

        self.fitted = Some(FittedModel { model, scaler });

        Ok(report)
    }

    /// Demand score in [0, 100] for a stop at the given hour and weekday.
    ///
    /// The stop itself is not a model feature, only its position is. Occupancy and
    /// trip count fall back to fixed placeholders.
    pub fn predict(
        &self,
        _stop_id: &str,
        hour: u8,
        day_of_week: u8,
        latitude: f64,
        longitude: f64,
    ) -> Result<f64, ServiceError> {
        let features: FeatureVector = [
            hour as f64,
            day_of_week as f64,
            flag(is_weekend(day_of_week)),
            flag(is_rush_hour(hour)),
            latitude,
            longitude,
            DEFAULT_OCCUPANCY,
            DEFAULT_TRIP_COUNT,
        ];

        self.predict_features(&features)
    }

    pub fn predict_features(&self, features: &FeatureVector) -> Result<f64, ServiceError> {
        let fitted = self.fitted.as_ref().ok_or(ServiceError::ModelNotTrained)?;

        let raw = fitted.model.predict(&fitted.scaler.transform(features));

        Ok(clip_demand(raw))
    }

    /// Writes model, scaler and trained flag as one document, replacing any previous file.
    #[tracing::instrument(err, skip(self))]
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let Some(fitted) = &self.fitted else {
            bail!(ServiceError::ModelNotTrained);
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let artifact = ModelArtifact {
            model: fitted.model.clone(),
            scaler: fitted.scaler.clone(),
            is_trained: true,
        };

        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, serde_json::to_vec(&artifact)?)
            .with_context(|| format!("writing {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| format!("replacing {}", path.display()))?;

        info!("Model saved to {}", path.display());

        Ok(())
    }

    #[tracing::instrument(err)]
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let artifact: ModelArtifact = serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing model {}", path.display()))?;

        let params = *artifact.model.params();
        let trees = artifact.model.tree_count();
        let fitted = artifact.is_trained.then_some(FittedModel {
            model: artifact.model,
            scaler: artifact.scaler,
        });

        info!(
            "Model loaded from {} with {} trees",
            path.display(),
            trees
        );

        Ok(DemandPredictor { params, fitted })
    }
}

pub fn feature_vector(row: &DemandFeatureRow) -> FeatureVector {
    [
        row.hour as f64,
        row.day_of_week as f64,
        flag(row.is_weekend),
        flag(row.is_rush_hour),
        row.latitude,
        row.longitude,
        row.avg_occupancy,
        row.trip_count as f64,
    ]
}

fn flag(value: bool) -> f64 {
    if value { 1.0 } else { 0.0 }
}

fn mean_absolute_error(truth: &[f64], predicted: &[f64]) -> f64 {
    let n = truth.len().max(1) as f64;
    truth
        .iter()
        .zip(predicted)
        .map(|(t, p)| (t - p).abs())
        .sum::<f64>()
        / n
}

fn mean_squared_error(truth: &[f64], predicted: &[f64]) -> f64 {
    let n = truth.len().max(1) as f64;
    truth
        .iter()
        .zip(predicted)
        .map(|(t, p)| (t - p).powi(2))
        .sum::<f64>()
        / n
}

/// Coefficient of determination. A constant target scores 1 when matched exactly, else 0.
fn r2_score(truth: &[f64], predicted: &[f64]) -> f64 {
    let n = truth.len().max(1) as f64;
    let mean = truth.iter().sum::<f64>() / n;

    let ss_res: f64 = truth
        .iter()
        .zip(predicted)
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    let ss_tot: f64 = truth.iter().map(|t| (t - mean).powi(2)).sum();

    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }

    1.0 - ss_res / ss_tot
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Rows where demand rises sharply in rush hour and at the northern stop.
    pub(crate) fn training_rows() -> Vec<DemandFeatureRow> {
        let mut rows = vec![];

        for (stop_id, lat, lon) in [("north", 5.65, -0.20), ("south", 5.55, -0.18)] {
            for day in 0..7u8 {
                for hour in 5..23u8 {
                    let busy = if is_rush_hour(hour) { 3 } else { 1 };
                    let boost = if stop_id == "north" { 2 } else { 1 };
                    let trips = busy * boost;
                    rows.push(DemandFeatureRow::aggregate(
                        stop_id.to_string(),
                        hour,
                        day,
                        0.5,
                        trips,
                        lat,
                        lon,
                    ));
                }
            }
        }

        rows
    }

    fn small_params() -> ForestParams {
        ForestParams {
            n_estimators: 10,
            ..ForestParams::default()
        }
    }

    fn temp_model_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir()
            .join(format!("transit_demand_{}_{}", std::process::id(), name))
            .join("demand_predictor.json")
    }

    #[test]
    fn test_predict_before_training_fails() {
        let predictor = DemandPredictor::new(small_params());

        let err = predictor.predict("s", 8, 1, 5.6, -0.18).unwrap_err();
        assert!(matches!(err, ServiceError::ModelNotTrained));
        assert!(!predictor.is_trained());
    }

    #[test]
    fn test_train_reports_metrics() -> anyhow::Result<()> {
        let rows = training_rows();
        let mut predictor = DemandPredictor::new(small_params());

        let report = predictor.train(&rows)?;

        assert!(predictor.is_trained());
        assert_eq!(report.train_rows + report.test_rows, rows.len());
        // ceil(252 * 0.2)
        assert_eq!(report.test_rows, 51);
        assert!(report.mae >= 0.0);
        assert!((report.rmse * report.rmse) + 1e-9 >= report.mae * report.mae);
        assert!(report.r2 > 0.5, "r2 was {}", report.r2);

        Ok(())
    }

    #[test]
    fn test_train_needs_two_rows() {
        let rows = training_rows().into_iter().take(1).collect_vec();
        let mut predictor = DemandPredictor::new(small_params());

        assert!(predictor.train(&rows).is_err());
        assert!(!predictor.is_trained());
    }

    #[test]
    fn test_training_is_reproducible() -> anyhow::Result<()> {
        let rows = training_rows();

        let mut a = DemandPredictor::new(small_params());
        let mut b = DemandPredictor::new(small_params());
        assert_eq!(a.train(&rows)?, b.train(&rows)?);
        assert_eq!(
            a.predict("x", 8, 2, 5.65, -0.20)?,
            b.predict("x", 8, 2, 5.65, -0.20)?
        );

        Ok(())
    }

    #[test]
    fn test_predictions_are_clipped() -> anyhow::Result<()> {
        // raw scores outside the range, as an unclipped feature file could contain
        let mut rows = training_rows();
        for row in rows.iter_mut() {
            row.demand_score = if row.is_rush_hour { 250.0 } else { -40.0 };
        }

        let mut predictor = DemandPredictor::new(small_params());
        predictor.train(&rows)?;

        for (hour, day, lat, lon) in [
            (8, 1, 5.65, -0.20),
            (12, 6, 5.55, -0.18),
            (23, 6, 89.0, 179.0),
            (0, 0, -89.0, -179.0),
        ] {
            let score = predictor.predict("x", hour, day, lat, lon)?;
            assert!((0.0..=100.0).contains(&score), "score {score}");
        }

        assert_eq!(predictor.predict("x", 8, 1, 5.65, -0.20)?, 100.0);
        assert_eq!(predictor.predict("x", 12, 1, 5.65, -0.20)?, 0.0);

        Ok(())
    }

    #[test]
    fn test_save_and_load_round_trip() -> anyhow::Result<()> {
        let rows = training_rows();
        let mut predictor = DemandPredictor::new(small_params());
        predictor.train(&rows)?;

        let path = temp_model_path("round_trip");
        predictor.save(&path)?;
        let loaded = DemandPredictor::load(&path)?;

        assert!(loaded.is_trained());
        for (hour, day) in [(8, 1), (13, 4), (18, 6), (22, 0)] {
            assert_eq!(
                predictor.predict("x", hour, day, 5.6, -0.19)?,
                loaded.predict("x", hour, day, 5.6, -0.19)?
            );
        }

        if let Some(dir) = path.parent() {
            let _ = fs::remove_dir_all(dir);
        }

        Ok(())
    }

    #[test]
    fn test_untrained_model_is_not_saved() {
        let predictor = DemandPredictor::new(small_params());
        let path = temp_model_path("untrained");

        assert!(predictor.save(&path).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_corrupt_model_file_fails_to_load() -> anyhow::Result<()> {
        let path = temp_model_path("corrupt");
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, br#"{"model": {"params": "#)?;

        assert!(DemandPredictor::load(&path).is_err());

        if let Some(dir) = path.parent() {
            let _ = fs::remove_dir_all(dir);
        }

        Ok(())
    }

    #[test]
    fn test_r2_edge_cases() {
        assert_eq!(r2_score(&[1.0, 1.0], &[1.0, 1.0]), 1.0);
        assert_eq!(r2_score(&[1.0, 1.0], &[2.0, 1.0]), 0.0);
        assert_eq!(r2_score(&[1.0, 3.0], &[1.0, 3.0]), 1.0);
    }
}
