//! SmartCore random forest wrapper
//!
//! Bagged regression trees over a dense row-major matrix. The fitted forest
//! is serialized together with its parameters so a reloaded model predicts
//! exactly what the trainer evaluated.

use ::smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use ::smartcore::linalg::basic::matrix::DenseMatrix;
use serde::{Deserialize, Serialize};

use super::MlError;

type Forest = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Random forest hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestParams {
    pub n_trees: usize,
    pub max_depth: Option<u16>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for RandomForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: Some(20),
            min_samples_split: 5,
            min_samples_leaf: 2,
            seed: 42,
        }
    }
}

impl RandomForestParams {
    fn to_smartcore(&self, n_features: usize) -> RandomForestRegressorParameters {
        RandomForestRegressorParameters {
            max_depth: self.max_depth,
            min_samples_leaf: self.min_samples_leaf,
            min_samples_split: self.min_samples_split,
            n_trees: self.n_trees,
            // Every split considers every feature
            m: Some(n_features),
            keep_samples: false,
            seed: self.seed,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SmartcoreRandomForest {
    pub params: RandomForestParams,
    pub n_features: usize,
    model: Forest,
}

impl SmartcoreRandomForest {
    /// Fit a forest on row-major features `x` and targets `y`
    pub fn train(x: &[Vec<f64>], y: &[f64], params: RandomForestParams) -> Result<Self, MlError> {
        let x_matrix = dense_matrix(x)?;
        if x.len() != y.len() {
            return Err(MlError::InvalidData(format!(
                "Feature and target count mismatch: {} features, {} targets",
                x.len(),
                y.len()
            )));
        }
        let n_features = x[0].len();

        let model = Forest::fit(&x_matrix, &y.to_vec(), params.to_smartcore(n_features))
            .map_err(|e| MlError::Training(format!("RandomForest training failed: {:?}", e)))?;

        Ok(Self {
            params,
            n_features,
            model,
        })
    }

    pub fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>, MlError> {
        if let Some(row) = x.iter().find(|r| r.len() != self.n_features) {
            return Err(MlError::PredictionFailure(format!(
                "Feature count mismatch: expected {}, got {}",
                self.n_features,
                row.len()
            )));
        }
        let x_matrix = dense_matrix(x)?;
        self.model
            .predict(&x_matrix)
            .map_err(|e| MlError::PredictionFailure(format!("{:?}", e)))
    }
}

fn dense_matrix(x: &[Vec<f64>]) -> Result<DenseMatrix<f64>, MlError> {
    if x.is_empty() {
        return Err(MlError::InvalidData("Empty feature matrix".to_string()));
    }

    let n_samples = x.len();
    let n_features = x[0].len();
    if n_features == 0 {
        return Err(MlError::InvalidData("Feature matrix has no columns".to_string()));
    }

    let mut flat_data = Vec::with_capacity(n_samples * n_features);
    for row in x {
        if row.len() != n_features {
            return Err(MlError::InvalidData(
                "All feature vectors must have the same length".to_string(),
            ));
        }
        flat_data.extend_from_slice(row);
    }

    Ok(DenseMatrix::new(n_samples, n_features, flat_data, false))
}
