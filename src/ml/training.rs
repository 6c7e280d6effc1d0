//! Model training pipeline
//!
//! For every location in the fetched history: clean the target, negotiate
//! the feature schema, hold out a seeded test split, fit both regressors,
//! evaluate them and persist the pair.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use itertools::Itertools;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::{error, info, warn};

use super::boosting::{BoostingParams, GradientBoostedTrees};
use super::features::{FeatureColumn, FeatureEngineer, FeatureTable};
use super::models::{Regressor, TrainedModel};
use super::smartcore::{RandomForestParams, SmartcoreRandomForest};
use super::store::{model_key, ModelArtifact, ModelStore};
use super::{Algorithm, FeatureImportance, MlError, ModelMetadata, ModelMetrics};
use crate::config::MlConfig;
use crate::domain::LocationSelector;
use crate::repo::{fetch_history_with_timeout, MeasurementRepository};

const TOP_FEATURES: usize = 10;

/// Training Configuration
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub random_forest: RandomForestParams,
    pub boosting: BoostingParams,
    /// Fraction of rows held out for evaluation
    pub test_size: f64,
    pub cv_folds: usize,
    pub split_seed: u64,
    pub min_training_rows: usize,
    pub training_window: chrono::Duration,
    pub fetch_timeout: Duration,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self::from_ml_config(&MlConfig::default())
    }
}

impl TrainingConfig {
    pub fn from_ml_config(cfg: &MlConfig) -> Self {
        Self {
            random_forest: RandomForestParams::default(),
            boosting: BoostingParams::default(),
            test_size: 0.2,
            cv_folds: 5,
            split_seed: 42,
            min_training_rows: cfg.min_training_rows,
            training_window: cfg.training_window(),
            fetch_timeout: cfg.fetch_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TrainingStatus {
    Success,
    /// History was fetched but no location produced models
    NoModelsTrained,
}

/// Held-out metrics of both models for one location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationMetrics {
    pub random_forest: ModelMetrics,
    pub xgboost: ModelMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationTraining {
    pub location: String,
    pub models: Vec<Algorithm>,
    pub metrics: LocationMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedLocation {
    pub location: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingResult {
    pub status: TrainingStatus,
    pub models_trained: Vec<LocationTraining>,
    pub skipped: Vec<SkippedLocation>,
    /// Metrics keyed by model key (`rf_<location>`, `xgb_<location>`)
    pub metrics: BTreeMap<String, ModelMetrics>,
}

/// Model Trainer
pub struct ModelTrainer {
    repo: Arc<dyn MeasurementRepository>,
    store: Arc<dyn ModelStore>,
    engineer: FeatureEngineer,
    config: TrainingConfig,
}

impl ModelTrainer {
    pub fn new(
        repo: Arc<dyn MeasurementRepository>,
        store: Arc<dyn ModelStore>,
        config: TrainingConfig,
    ) -> Self {
        Self {
            repo,
            store,
            engineer: FeatureEngineer::new(),
            config,
        }
    }

    /// Train both models for every location matched by `selector`
    pub async fn train_all_models(&self, selector: &LocationSelector) -> Result<TrainingResult, MlError> {
        self.train_window(selector, self.config.training_window).await
    }

    /// Same as [`Self::train_all_models`] over an explicit history window
    pub async fn train_window(
        &self,
        selector: &LocationSelector,
        window: chrono::Duration,
    ) -> Result<TrainingResult, MlError> {
        info!(selector = %selector, "Starting model training");

        let measurements =
            fetch_history_with_timeout(self.repo.as_ref(), selector, window, self.config.fetch_timeout).await;
        if measurements.is_empty() {
            error!(selector = %selector, "No training data available");
            return Err(MlError::NoTrainingData);
        }
        info!(rows = measurements.len(), "Fetched records for training");

        let table = self.engineer.create_features(&measurements);
        let locations: Vec<String> = table.locations().into_iter().map(str::to_string).collect();

        let mut models_trained = Vec::new();
        let mut skipped = Vec::new();
        let mut metrics = BTreeMap::new();

        for location in locations {
            info!(location = %location, "Training models");
            let location_table = table.for_location(&location);
            let store = Arc::clone(&self.store);
            let config = self.config.clone();
            let engineer = self.engineer;
            let loc = location.clone();

            let outcome = tokio::task::spawn_blocking(move || {
                train_location(&loc, location_table, &engineer, &config, store.as_ref())
            })
            .await
            .unwrap_or_else(|e| Err(MlError::Training(format!("training task failed: {e}"))));

            match outcome {
                Ok(trained) => {
                    metrics.insert(
                        model_key(Algorithm::RandomForest, &location),
                        trained.metrics.random_forest.clone(),
                    );
                    metrics.insert(
                        model_key(Algorithm::Xgboost, &location),
                        trained.metrics.xgboost.clone(),
                    );
                    models_trained.push(trained);
                }
                Err(e @ MlError::InsufficientData { .. }) => {
                    warn!(location = %location, error = %e, "Skipping location");
                    skipped.push(SkippedLocation {
                        location,
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    error!(location = %location, error = %e, "Training failed for location");
                    skipped.push(SkippedLocation {
                        location,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let status = if models_trained.is_empty() {
            TrainingStatus::NoModelsTrained
        } else {
            TrainingStatus::Success
        };
        info!(
            status = %status,
            trained = models_trained.len(),
            skipped = skipped.len(),
            "Training completed"
        );

        Ok(TrainingResult {
            status,
            models_trained,
            skipped,
            metrics,
        })
    }

    /// Stored metrics for a model key, if any
    pub fn get_model_metrics(&self, model_name: &str) -> Result<Option<ModelMetrics>, MlError> {
        self.store.load_metrics(model_name)
    }
}

/// Fit, evaluate and persist both models for one location.
///
/// Both models are stored in a single batch, after both fit and evaluate.
fn train_location(
    location: &str,
    table: FeatureTable,
    engineer: &FeatureEngineer,
    config: &TrainingConfig,
    store: &dyn ModelStore,
) -> Result<LocationTraining, MlError> {
    let mut clean = table.drop_missing(FeatureColumn::Pm25);
    if clean.len() < config.min_training_rows {
        return Err(MlError::InsufficientData {
            location: location.to_string(),
            rows: clean.len(),
            required: config.min_training_rows,
        });
    }

    let resolved = engineer.resolve_columns(&clean);
    if !resolved.missing.is_empty() {
        info!(location, missing = %resolved.missing.iter().join(", "), "Missing features");
    }
    if resolved.columns.is_empty() {
        return Err(MlError::Training(format!("no usable feature columns for {location}")));
    }
    let columns = resolved.columns;

    clean.mean_fill(&columns);
    let x = clean.to_matrix(&columns).rows().to_vec();
    let y: Vec<f64> = clean.column(FeatureColumn::Pm25).into_iter().flatten().collect();

    let split = TrainTestSplit::new(x.len(), config.test_size, config.split_seed);
    let (x_train, y_train) = split.train(&x, &y);
    let (x_test, y_test) = split.test(&x, &y);

    let rf = SmartcoreRandomForest::train(&x_train, &y_train, config.random_forest.clone())?;
    let mut rf_metrics = calculate_metrics(&rf.predict(&x_test)?, &y_test)?;
    rf_metrics.cv_mae = Some(cross_validated_mae(&x, &y, config.cv_folds, &config.random_forest)?);

    let gbm = GradientBoostedTrees::fit(
        &x_train,
        &y_train,
        Some((&x_test, &y_test)),
        config.boosting.clone(),
    )?;
    let mut xgb_metrics = calculate_metrics(&gbm.predict(&x_test)?, &y_test)?;
    xgb_metrics.top_features = Some(top_features(&columns, &gbm.feature_importances(), TOP_FEATURES));

    let metadata = |algorithm: Algorithm| ModelMetadata {
        model_id: format!("{}-{}", model_key(algorithm, location), uuid::Uuid::new_v4()),
        algorithm,
        location: location.to_string(),
        trained_at: Utc::now(),
        training_samples: x_train.len(),
        feature_columns: columns.clone(),
    };

    store.save_models(vec![
        ModelArtifact {
            key: model_key(Algorithm::RandomForest, location),
            model: TrainedModel::new(metadata(Algorithm::RandomForest), Regressor::RandomForest(rf)),
            metrics: rf_metrics.clone(),
        },
        ModelArtifact {
            key: model_key(Algorithm::Xgboost, location),
            model: TrainedModel::new(metadata(Algorithm::Xgboost), Regressor::GradientBoosting(gbm)),
            metrics: xgb_metrics.clone(),
        },
    ])?;
    info!(location, mae = rf_metrics.mae, cv_mae = ?rf_metrics.cv_mae, "Random forest trained");
    info!(location, mae = xgb_metrics.mae, "Boosted trees trained");

    Ok(LocationTraining {
        location: location.to_string(),
        models: vec![Algorithm::RandomForest, Algorithm::Xgboost],
        metrics: LocationMetrics {
            random_forest: rf_metrics,
            xgboost: xgb_metrics,
        },
    })
}

/// Seeded shuffle split: the first `ceil(test_size * n)` shuffled rows are the test set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

impl TrainTestSplit {
    pub fn new(n: usize, test_size: f64, seed: u64) -> Self {
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(&mut StdRng::seed_from_u64(seed));

        let n_test = ((n as f64 * test_size).ceil() as usize).min(n.saturating_sub(1));
        let train = indices.split_off(n_test);
        Self {
            train,
            test: indices,
        }
    }

    fn train(&self, x: &[Vec<f64>], y: &[f64]) -> (Vec<Vec<f64>>, Vec<f64>) {
        select(&self.train, x, y)
    }

    fn test(&self, x: &[Vec<f64>], y: &[f64]) -> (Vec<Vec<f64>>, Vec<f64>) {
        select(&self.test, x, y)
    }
}

fn select(indices: &[usize], x: &[Vec<f64>], y: &[f64]) -> (Vec<Vec<f64>>, Vec<f64>) {
    indices.iter().map(|&i| (x[i].clone(), y[i])).unzip()
}

/// Contiguous, unshuffled folds; the first `n % k` folds take one extra row
pub fn kfold_ranges(n: usize, k: usize) -> Vec<std::ops::Range<usize>> {
    let k = k.clamp(1, n.max(1));
    let base = n / k;
    let extra = n % k;

    let mut start = 0;
    (0..k)
        .map(|fold| {
            let len = base + usize::from(fold < extra);
            let range = start..start + len;
            start += len;
            range
        })
        .collect()
}

/// Mean held-out MAE of a random forest refit on each of `k` folds
fn cross_validated_mae(
    x: &[Vec<f64>],
    y: &[f64],
    k: usize,
    params: &RandomForestParams,
) -> Result<f64, MlError> {
    let folds = kfold_ranges(x.len(), k);
    let mut maes = Vec::with_capacity(folds.len());

    for fold in &folds {
        let (x_train, y_train): (Vec<Vec<f64>>, Vec<f64>) = (0..x.len())
            .filter(|i| !fold.contains(i))
            .map(|i| (x[i].clone(), y[i]))
            .unzip();
        if x_train.is_empty() || fold.is_empty() {
            continue;
        }

        let model = SmartcoreRandomForest::train(&x_train, &y_train, params.clone())?;
        let pred = model.predict(&x[fold.clone()])?;
        maes.push(calculate_metrics(&pred, &y[fold.clone()])?.mae);
    }

    if maes.is_empty() {
        return Err(MlError::Training("cross-validation produced no folds".to_string()));
    }
    Ok(maes.iter().sum::<f64>() / maes.len() as f64)
}

/// Highest-importance columns first
fn top_features(columns: &[FeatureColumn], importances: &[f64], n: usize) -> Vec<FeatureImportance> {
    columns
        .iter()
        .zip(importances)
        .sorted_by(|a, b| b.1.total_cmp(a.1))
        .take(n)
        .map(|(column, &importance)| FeatureImportance {
            feature: column.to_string(),
            importance,
        })
        .collect()
}

/// Calculate validation metrics
pub fn calculate_metrics(predictions: &[f64], targets: &[f64]) -> Result<ModelMetrics, MlError> {
    if predictions.len() != targets.len() {
        return Err(MlError::InvalidData("Prediction and target count mismatch".to_string()));
    }

    if predictions.is_empty() {
        return Err(MlError::InvalidData("No predictions to evaluate".to_string()));
    }

    let n = predictions.len() as f64;

    // Mean Absolute Error
    let mae: f64 = predictions
        .iter()
        .zip(targets)
        .map(|(p, t)| (p - t).abs())
        .sum::<f64>()
        / n;

    // Root Mean Square Error
    let mse: f64 = predictions
        .iter()
        .zip(targets)
        .map(|(p, t)| (p - t).powi(2))
        .sum::<f64>()
        / n;
    let rmse = mse.sqrt();

    // Mean Absolute Percentage Error, zero targets contribute nothing
    let mape: f64 = predictions
        .iter()
        .zip(targets)
        .filter(|(_, t)| t.abs() > 1e-10)
        .map(|(p, t)| ((p - t) / t).abs() * 100.0)
        .sum::<f64>()
        / n;

    // R-squared
    let mean_target: f64 = targets.iter().sum::<f64>() / n;
    let ss_tot: f64 = targets.iter().map(|t| (t - mean_target).powi(2)).sum();
    let ss_res: f64 = predictions
        .iter()
        .zip(targets)
        .map(|(p, t)| (t - p).powi(2))
        .sum();

    let r2 = if ss_tot.abs() < 1e-10 {
        0.0
    } else {
        1.0 - (ss_res / ss_tot)
    };

    Ok(ModelMetrics {
        mae,
        rmse,
        r2,
        mape,
        samples: predictions.len(),
        timestamp: Utc::now(),
        cv_mae: None,
        top_features: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Measurement;
    use crate::ml::store::{InMemoryModelStore, ModelInfo};
    use crate::ml::ForecastModel;
    use crate::repo::{InMemoryRepository, MockMeasurementRepository};
    use chrono::TimeZone;

    /// Small forests keep the suite fast
    fn fast_config() -> TrainingConfig {
        TrainingConfig {
            random_forest: RandomForestParams {
                n_trees: 10,
                max_depth: Some(6),
                ..Default::default()
            },
            boosting: BoostingParams {
                n_estimators: 20,
                max_depth: 4,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn hourly_history(location: &str, rows: usize) -> Vec<Measurement> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..rows)
            .map(|i| {
                let hour = (i % 24) as f64;
                let pm25 = 20.0 + 10.0 * (hour / 24.0 * std::f64::consts::TAU).sin() + (i % 7) as f64;
                Measurement::new(location, start + chrono::Duration::hours(i as i64))
                    .with_pm25(pm25)
                    .with_weather(5.0 + hour * 0.3, 60.0 + (i % 10) as f64, 1012.0)
            })
            .collect()
    }

    fn trainer_with(
        measurements: Vec<Measurement>,
    ) -> (ModelTrainer, Arc<InMemoryModelStore>) {
        let repo = Arc::new(InMemoryRepository::with_measurements(measurements));
        let store = Arc::new(InMemoryModelStore::new());
        let trainer = ModelTrainer::new(repo, store.clone(), fast_config());
        (trainer, store)
    }

    /// Rejects any batch containing a boosted-tree artifact
    #[derive(Default)]
    struct RejectXgbStore {
        inner: InMemoryModelStore,
    }

    impl ModelStore for RejectXgbStore {
        fn save_models(&self, artifacts: Vec<ModelArtifact>) -> Result<(), MlError> {
            if artifacts.iter().any(|a| a.key.starts_with("xgb_")) {
                return Err(MlError::Io(std::io::Error::other("disk full")));
            }
            self.inner.save_models(artifacts)
        }

        fn load_model(&self, key: &str) -> Result<Option<Arc<dyn ForecastModel>>, MlError> {
            self.inner.load_model(key)
        }

        fn load_metrics(&self, key: &str) -> Result<Option<ModelMetrics>, MlError> {
            self.inner.load_metrics(key)
        }

        fn list_models(&self) -> Result<Vec<ModelInfo>, MlError> {
            self.inner.list_models()
        }
    }

    #[test]
    fn test_calculate_metrics() {
        let predictions = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let targets = vec![1.1, 2.1, 2.9, 4.2, 4.8];

        let metrics = calculate_metrics(&predictions, &targets).unwrap();

        assert!(metrics.mae < 0.3);
        assert!(metrics.rmse < 0.4);
        assert!(metrics.r2 > 0.9);
        assert_eq!(metrics.samples, 5);
    }

    #[test]
    fn test_mape_skips_zero_targets() {
        // only the second pair counts: |(3 - 2) / 2| = 50%, divided over both rows
        let metrics = calculate_metrics(&[1.0, 3.0], &[0.0, 2.0]).unwrap();
        assert!((metrics.mape - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_calculate_metrics_rejects_bad_input() {
        assert!(calculate_metrics(&[], &[]).is_err());
        assert!(calculate_metrics(&[1.0], &[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_split_is_deterministic() {
        let a = TrainTestSplit::new(150, 0.2, 42);
        let b = TrainTestSplit::new(150, 0.2, 42);
        assert_eq!(a, b);
        assert_eq!(a.test.len(), 30);
        assert_eq!(a.train.len(), 120);

        let mut all: Vec<usize> = a.train.iter().chain(&a.test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..150).collect::<Vec<_>>());

        let other = TrainTestSplit::new(150, 0.2, 7);
        assert_ne!(a.test, other.test);
    }

    #[test]
    fn test_split_rounds_test_size_up() {
        let split = TrainTestSplit::new(101, 0.2, 42);
        assert_eq!(split.test.len(), 21);
    }

    #[test]
    fn test_kfold_ranges() {
        let folds = kfold_ranges(12, 5);
        assert_eq!(folds, vec![0..3, 3..6, 6..8, 8..10, 10..12]);

        let folds = kfold_ranges(3, 5);
        assert_eq!(folds.len(), 3);
        assert!(folds.iter().all(|f| f.len() == 1));
    }

    #[test]
    fn test_top_features_sorted_and_truncated() {
        let columns = [FeatureColumn::Hour, FeatureColumn::Pm25Lag1h, FeatureColumn::Month];
        let top = top_features(&columns, &[0.2, 0.7, 0.1], 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].feature, "pm25_lag_1h");
        assert_eq!(top[1].feature, "hour");
    }

    #[tokio::test]
    async fn test_empty_history_is_no_training_data() {
        let (trainer, _) = trainer_with(Vec::new());
        let result = trainer.train_all_models(&LocationSelector::All).await;
        assert!(matches!(result, Err(MlError::NoTrainingData)));
    }

    #[tokio::test]
    async fn test_fetch_failure_is_no_training_data() {
        let mut repo = MockMeasurementRepository::new();
        repo.expect_fetch_history()
            .returning(|_, _| Err(anyhow::anyhow!("database unavailable")));
        repo.expect_persist_predictions().never();

        let trainer = ModelTrainer::new(Arc::new(repo), Arc::new(InMemoryModelStore::new()), fast_config());
        let result = trainer.train_all_models(&LocationSelector::named("Old Town")).await;
        assert!(matches!(result, Err(MlError::NoTrainingData)));
    }

    #[tokio::test]
    async fn test_short_location_skipped_other_trained() {
        let mut history = hourly_history("Harbor", 50);
        history.extend(hourly_history("Old Town", 150));
        let (trainer, store) = trainer_with(history);

        let result = trainer.train_all_models(&LocationSelector::All).await.unwrap();

        assert_eq!(result.status, TrainingStatus::Success);
        assert_eq!(result.models_trained.len(), 1);
        assert_eq!(result.models_trained[0].location, "Old Town");
        assert_eq!(
            result.models_trained[0].models,
            vec![Algorithm::RandomForest, Algorithm::Xgboost]
        );

        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].location, "Harbor");
        assert!(result.skipped[0].reason.contains("50 samples"));

        assert!(store.load_model("rf_old_town").unwrap().is_some());
        assert!(store.load_model("xgb_old_town").unwrap().is_some());
        assert!(store.load_model("rf_harbor").unwrap().is_none());

        let keys: Vec<&String> = result.metrics.keys().collect();
        assert_eq!(keys, vec!["rf_old_town", "xgb_old_town"]);
    }

    #[tokio::test]
    async fn test_metrics_are_recorded() {
        let (trainer, _) = trainer_with(hourly_history("Old Town", 150));
        let result = trainer.train_all_models(&LocationSelector::All).await.unwrap();

        let metrics = &result.models_trained[0].metrics;
        // ceil(0.2 * 150)
        assert_eq!(metrics.random_forest.samples, 30);
        assert!(metrics.random_forest.cv_mae.is_some());
        assert!(metrics.random_forest.top_features.is_none());
        assert!(metrics.xgboost.cv_mae.is_none());
        let top = metrics.xgboost.top_features.as_ref().unwrap();
        assert!(!top.is_empty() && top.len() <= TOP_FEATURES);
        assert!(metrics.xgboost.mae.is_finite());

        let stored = trainer.get_model_metrics("xgb_old_town").unwrap().unwrap();
        assert_eq!(stored.mae, metrics.xgboost.mae);
        assert!(trainer.get_model_metrics("xgb_nowhere").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rows_without_target_do_not_count() {
        let mut history = hourly_history("Old Town", 120);
        for m in history.iter_mut().take(30) {
            m.pm25 = None;
        }
        let (trainer, _) = trainer_with(history);

        let result = trainer.train_all_models(&LocationSelector::All).await.unwrap();
        assert_eq!(result.status, TrainingStatus::NoModelsTrained);
        assert!(result.skipped[0].reason.contains("90 samples"));
    }

    #[tokio::test]
    async fn test_persisted_models_use_resolved_columns() {
        let (trainer, store) = trainer_with(hourly_history("Old Town", 120));
        trainer.train_all_models(&LocationSelector::All).await.unwrap();

        let model = store.load_model("rf_old_town").unwrap().unwrap();
        let columns = model.feature_columns();
        // no wind or pollutant co-readings in this history
        assert!(!columns.contains(&FeatureColumn::WindSpeed));
        assert!(!columns.contains(&FeatureColumn::Pm10));
        assert!(columns.contains(&FeatureColumn::Pm25Lag1h));
        assert!(columns.contains(&FeatureColumn::Temperature));
        assert!(!columns.contains(&FeatureColumn::Pm25));
    }

    #[tokio::test]
    async fn test_failed_save_leaves_no_half_pair() {
        let repo = Arc::new(InMemoryRepository::with_measurements(hourly_history("Old Town", 150)));
        let store = Arc::new(RejectXgbStore::default());
        let trainer = ModelTrainer::new(repo, store.clone(), fast_config());

        let result = trainer.train_all_models(&LocationSelector::All).await.unwrap();

        assert_eq!(result.status, TrainingStatus::NoModelsTrained);
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].location, "Old Town");
        assert!(result.skipped[0].reason.contains("disk full"));
        assert!(result.metrics.is_empty());

        assert!(store.load_model("rf_old_town").unwrap().is_none());
        assert!(store.load_model("xgb_old_town").unwrap().is_none());
        assert!(store.list_models().unwrap().is_empty());
    }
}
