//! Recursive multi-hour PM2.5 prediction
//!
//! The most recent feature row of a location seeds the forecast. Each hour
//! moves the seed's calendar columns to the target time, runs every loaded
//! model, and feeds the hour's last emitted value back into `pm25_lag_1h`.
//!
//! All other lag and rolling columns stay frozen at the seed's values for the
//! whole horizon. Forecasts beyond a few hours therefore carry stale context.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use super::features::{FeatureColumn, FeatureEngineer, FeatureRow, FeatureTable};
use super::models::ForecastModel;
use super::store::{model_key, ModelInfo, ModelStore};
use super::{Algorithm, MlError};
use crate::config::MlConfig;
use crate::domain::{LocationSelector, ModelVariant, PredictionRecord};
use crate::repo::{fetch_history_with_timeout, MeasurementRepository};

/// Heuristic confidence for a prediction; not a statistical interval.
///
/// Starts from the variant's base score and drops for high predicted
/// concentrations, rounded to two decimals.
pub fn confidence(raw_prediction: f64, variant: ModelVariant) -> f64 {
    let base = variant.base_confidence();
    let scaled = if raw_prediction > 100.0 {
        base * 0.8
    } else if raw_prediction > 50.0 {
        base * 0.9
    } else {
        base
    };
    (scaled * 100.0).round() / 100.0
}

/// Prediction service holding a per-instance cache of loaded models
pub struct PredictionService {
    repo: Arc<dyn MeasurementRepository>,
    store: Arc<dyn ModelStore>,
    engineer: FeatureEngineer,
    history_window: chrono::Duration,
    fetch_timeout: Duration,
    loaded_models: RwLock<HashMap<String, Arc<dyn ForecastModel>>>,
}

impl PredictionService {
    pub fn new(
        repo: Arc<dyn MeasurementRepository>,
        store: Arc<dyn ModelStore>,
        config: &MlConfig,
    ) -> Self {
        Self {
            repo,
            store,
            engineer: FeatureEngineer::new(),
            history_window: config.prediction_window(),
            fetch_timeout: config.fetch_timeout(),
            loaded_models: RwLock::new(HashMap::new()),
        }
    }

    /// Forecast `hours_ahead` hours for `location`.
    ///
    /// Never fails: any error is logged and yields an empty result.
    pub async fn predict(&self, location: &str, hours_ahead: u32) -> Vec<PredictionRecord> {
        match self.try_predict(location, hours_ahead).await {
            Ok(records) => records,
            Err(e) => {
                error!(location, error = %e, "Prediction error");
                Vec::new()
            }
        }
    }

    async fn try_predict(&self, location: &str, hours_ahead: u32) -> Result<Vec<PredictionRecord>, MlError> {
        let history = fetch_history_with_timeout(
            self.repo.as_ref(),
            &LocationSelector::named(location),
            self.history_window,
            self.fetch_timeout,
        )
        .await;
        if history.is_empty() {
            warn!(location, "No data available");
            return Ok(Vec::new());
        }

        let table = self.engineer.create_features(&history);
        let seed = table
            .last_for(location)
            .ok_or_else(|| MlError::PredictionFailure(format!("no feature rows for {location}")))?
            .clone();

        let models: Vec<(Algorithm, Arc<dyn ForecastModel>)> = [Algorithm::RandomForest, Algorithm::Xgboost]
            .into_iter()
            .filter_map(|algorithm| {
                self.load_model(&model_key(algorithm, location))
                    .map(|model| (algorithm, model))
            })
            .collect();
        if models.is_empty() {
            warn!(location, "No models loaded for location");
        }

        // tree ensembles are CPU bound; keep them off the async workers
        let engineer = self.engineer;
        let made_at = Utc::now();
        let records = tokio::task::spawn_blocking(move || {
            run_forecast(&engineer, &seed, &models, hours_ahead, made_at)
        })
        .await
        .map_err(|e| MlError::PredictionFailure(format!("forecast task failed: {e}")))?;

        self.save_predictions(location, &records).await;
        Ok(records)
    }

    /// Run the autoregressive loop from `seed`. Hours are strictly sequential.
    pub fn forecast(
        &self,
        seed: &FeatureRow,
        models: &[(Algorithm, Arc<dyn ForecastModel>)],
        hours_ahead: u32,
        made_at: DateTime<Utc>,
    ) -> Vec<PredictionRecord> {
        run_forecast(&self.engineer, seed, models, hours_ahead, made_at)
    }

    /// Cached model for `key`; misses and failures are not cached
    fn load_model(&self, key: &str) -> Option<Arc<dyn ForecastModel>> {
        if let Some(model) = self.loaded_models.read().get(key) {
            return Some(Arc::clone(model));
        }

        match self.store.load_model(key) {
            Ok(Some(model)) => {
                info!(model = key, "Loaded model");
                self.loaded_models
                    .write()
                    .insert(key.to_string(), Arc::clone(&model));
                Some(model)
            }
            Ok(None) => {
                let e = MlError::ModelNotFound(key.to_string());
                warn!(error = %e, "Skipping model");
                None
            }
            Err(e) => {
                error!(model = key, error = %e, "Error loading model");
                None
            }
        }
    }

    async fn save_predictions(&self, location: &str, records: &[PredictionRecord]) {
        if records.is_empty() {
            return;
        }
        match self.repo.persist_predictions(records).await {
            Ok(()) => info!(location, count = records.len(), "Saved predictions"),
            Err(e) => {
                let e = MlError::PersistenceFailure(e.to_string());
                error!(location, error = %e, "Error saving predictions");
            }
        }
    }

    /// Artifacts in the model store, sorted by name
    pub fn get_available_models(&self) -> Result<Vec<ModelInfo>, MlError> {
        self.store.list_models()
    }

    /// Drop every cached model so the next prediction reloads from the store
    pub fn clear_cache(&self) {
        let evicted = {
            let mut cache = self.loaded_models.write();
            let n = cache.len();
            cache.clear();
            n
        };
        debug!(evicted, "Cleared model cache");
    }

    pub fn cached_models(&self) -> usize {
        self.loaded_models.read().len()
    }
}

fn run_forecast(
    engineer: &FeatureEngineer,
    seed: &FeatureRow,
    models: &[(Algorithm, Arc<dyn ForecastModel>)],
    hours_ahead: u32,
    made_at: DateTime<Utc>,
) -> Vec<PredictionRecord> {
    let seed_time = seed.timestamp;
    let mut row = seed.clone();
    let mut records = Vec::new();

    for hour in 1..=hours_ahead {
        let target = seed_time + chrono::Duration::hours(i64::from(hour));
        row.apply_calendar(target);
        let table = FeatureTable::from_rows(vec![row.clone()]);

        let mut hour_records: Vec<PredictionRecord> = Vec::with_capacity(3);
        for (algorithm, model) in models {
            let x = engineer.prepare_for_prediction(&table, model.feature_columns());
            let raw = match model.predict(&x) {
                Ok(values) => match values.first() {
                    Some(&v) if v.is_finite() => v,
                    _ => {
                        warn!(location = %row.location, algorithm = %algorithm, "Model returned no usable value");
                        continue;
                    }
                },
                Err(e) => {
                    warn!(location = %row.location, algorithm = %algorithm, error = %e, "Model prediction failed");
                    continue;
                }
            };

            let variant = algorithm.variant();
            hour_records.push(PredictionRecord {
                location: row.location.clone(),
                prediction_made_at: made_at,
                target_timestamp: target,
                predicted_pm25: raw.max(0.0),
                confidence: confidence(raw, variant),
                model_name: variant,
            });
        }

        match hour_records.len() {
            0 => {}
            1 => hour_records[0].model_name = ModelVariant::SingleModel,
            n => {
                let mean = hour_records.iter().map(|r| r.predicted_pm25).sum::<f64>() / n as f64;
                hour_records.push(PredictionRecord {
                    location: row.location.clone(),
                    prediction_made_at: made_at,
                    target_timestamp: target,
                    predicted_pm25: mean.max(0.0),
                    confidence: confidence(mean, ModelVariant::Ensemble),
                    model_name: ModelVariant::Ensemble,
                });
            }
        }

        if let Some(last) = hour_records.last() {
            row.set(FeatureColumn::Pm25Lag1h, Some(last.predicted_pm25));
        }
        records.extend(hour_records);
    }

    records
}
