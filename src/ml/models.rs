//! Trained model artifacts
//!
//! A [`TrainedModel`] is what the trainer persists and the prediction
//! service loads: the fitted regressor plus the metadata (including the exact
//! feature column order) it was fitted with.

use serde::{Deserialize, Serialize};

use super::boosting::GradientBoostedTrees;
use super::features::{FeatureColumn, FeatureMatrix};
use super::smartcore::SmartcoreRandomForest;
use super::{Algorithm, MlError, ModelMetadata};

/// A regressor the prediction service can run
pub trait ForecastModel: Send + Sync {
    fn algorithm(&self) -> Algorithm;

    /// Column order the input matrix must follow
    fn feature_columns(&self) -> &[FeatureColumn];

    /// One raw prediction per input row
    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>, MlError>;
}

#[derive(Debug, Serialize, Deserialize)]
pub enum Regressor {
    RandomForest(SmartcoreRandomForest),
    GradientBoosting(GradientBoostedTrees),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TrainedModel {
    pub metadata: ModelMetadata,
    pub regressor: Regressor,
}

impl TrainedModel {
    pub fn new(metadata: ModelMetadata, regressor: Regressor) -> Self {
        Self {
            metadata,
            regressor,
        }
    }

    /// Predict on raw rows already in `feature_columns` order
    pub fn predict_rows(&self, x: &[Vec<f64>]) -> Result<Vec<f64>, MlError> {
        match &self.regressor {
            Regressor::RandomForest(model) => model.predict(x),
            Regressor::GradientBoosting(model) => model.predict(x),
        }
    }
}

impl ForecastModel for TrainedModel {
    fn algorithm(&self) -> Algorithm {
        self.metadata.algorithm
    }

    fn feature_columns(&self) -> &[FeatureColumn] {
        &self.metadata.feature_columns
    }

    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>, MlError> {
        if x.columns() != self.feature_columns() {
            return Err(MlError::PredictionFailure(format!(
                "Input columns do not match the {} columns {} was trained on",
                self.metadata.feature_columns.len(),
                self.metadata.model_id
            )));
        }
        self.predict_rows(x.rows())
    }
}
