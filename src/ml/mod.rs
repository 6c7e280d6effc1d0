//! Machine Learning Module
//!
//! PM2.5 forecasting core:
//! - Feature engineering over per-location measurement history
//! - Random forest and gradient-boosted tree regressors
//! - Training pipeline with held-out evaluation and cross-validation
//! - Model persistence keyed by algorithm and location
//! - Recursive multi-hour prediction service
//!
//! # Architecture
//! - `features` is pure and shared by training and inference
//! - `training` writes artifacts through a [`store::ModelStore`]
//! - `inference` reads them back and feeds its own output into the next hour

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use thiserror::Error;

use crate::domain::ModelVariant;

pub mod boosting;
pub mod features;
pub mod inference;
pub mod models;
pub mod smartcore;
pub mod store;
pub mod training;

pub use features::{FeatureColumn, FeatureEngineer, FeatureMatrix, FeatureRow, FeatureTable};
pub use inference::PredictionService;
pub use models::{ForecastModel, TrainedModel};
pub use store::{FileModelStore, InMemoryModelStore, ModelArtifact, ModelInfo, ModelStore};
pub use training::{ModelTrainer, TrainingConfig, TrainingResult};

/// Errors raised by the forecasting core
#[derive(Debug, Error)]
pub enum MlError {
    #[error("No training data available")]
    NoTrainingData,

    #[error("Insufficient data for {location}: {rows} samples (need {required})")]
    InsufficientData {
        location: String,
        rows: usize,
        required: usize,
    },

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Prediction failed: {0}")]
    PredictionFailure(String),

    #[error("Failed to persist predictions: {0}")]
    PersistenceFailure(String),

    #[error("Training failed: {0}")]
    Training(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Regression algorithms trained per location
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Algorithm {
    RandomForest,
    Xgboost,
}

impl Algorithm {
    /// Prefix used in artifact keys (`rf_<location>`, `xgb_<location>`)
    pub fn key_prefix(&self) -> &'static str {
        match self {
            Self::RandomForest => "rf",
            Self::Xgboost => "xgb",
        }
    }

    /// Classify an artifact by its file name. Anything not prefixed `rf_` is boosted trees.
    pub fn from_artifact_name(name: &str) -> Self {
        if name.starts_with("rf_") {
            Self::RandomForest
        } else {
            Self::Xgboost
        }
    }

    pub fn variant(&self) -> ModelVariant {
        match self {
            Self::RandomForest => ModelVariant::RandomForest,
            Self::Xgboost => ModelVariant::Xgboost,
        }
    }
}

/// Metadata stored alongside every trained model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_id: String,
    pub algorithm: Algorithm,
    pub location: String,
    pub trained_at: DateTime<Utc>,
    pub training_samples: usize,
    /// Column order the regressor was fitted on
    pub feature_columns: Vec<FeatureColumn>,
}

/// Importance of one input column in a fitted model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Held-out evaluation of a trained model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub mae: f64,  // Mean Absolute Error
    pub rmse: f64, // Root Mean Square Error
    pub r2: f64,   // R-squared
    pub mape: f64, // Mean Absolute Percentage Error
    pub samples: usize,
    pub timestamp: DateTime<Utc>,
    /// 5-fold cross-validated MAE (random forest only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cv_mae: Option<f64>,
    /// Ten most important features (boosted trees only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_features: Option<Vec<FeatureImportance>>,
}
