//! Model artifact storage
//!
//! Artifacts are keyed `{algorithm prefix}_{normalized location}`. The file
//! store writes the bincode model as `{key}.bin` and its evaluation as
//! `{key}_metrics.json` next to it.
//!
//! A training run hands both models of a location over as one batch. Every
//! file of the batch is staged under a unique temporary name first and only
//! renamed into place once all of them are on disk, so a failed write never
//! leaves half a pair behind.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::models::{ForecastModel, TrainedModel};
use super::{Algorithm, MlError, ModelMetrics};

const MODEL_EXTENSION: &str = "bin";
const METRICS_SUFFIX: &str = "_metrics.json";

/// Storage key for a location's model: lowercased, spaces replaced by `_`
pub fn model_key(algorithm: Algorithm, location: &str) -> String {
    format!(
        "{}_{}",
        algorithm.key_prefix(),
        location.to_lowercase().replace(' ', "_")
    )
}

/// Listing entry for one stored model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub algorithm: Algorithm,
    pub has_metrics: bool,
    pub file: String,
}

/// One model and its evaluation, stored under `key`
pub struct ModelArtifact {
    pub key: String,
    pub model: TrainedModel,
    pub metrics: ModelMetrics,
}

/// Persistence seam between the trainer and the prediction service
pub trait ModelStore: Send + Sync {
    /// Store every artifact or none of them
    fn save_models(&self, artifacts: Vec<ModelArtifact>) -> Result<(), MlError>;

    fn save_model(&self, key: &str, model: TrainedModel, metrics: &ModelMetrics) -> Result<(), MlError> {
        self.save_models(vec![ModelArtifact {
            key: key.to_string(),
            model,
            metrics: metrics.clone(),
        }])
    }

    /// `Ok(None)` when nothing is stored under `key`
    fn load_model(&self, key: &str) -> Result<Option<Arc<dyn ForecastModel>>, MlError>;

    fn load_metrics(&self, key: &str) -> Result<Option<ModelMetrics>, MlError>;

    fn list_models(&self) -> Result<Vec<ModelInfo>, MlError>;
}

/// Directory-backed store
#[derive(Debug, Clone)]
pub struct FileModelStore {
    dir: PathBuf,
}

impl FileModelStore {
    /// Open (and create if needed) the model directory
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, MlError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn model_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{MODEL_EXTENSION}"))
    }

    fn metrics_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}{METRICS_SUFFIX}"))
    }

    /// Write each `(dest, bytes)` to a temporary sibling, returning `(tmp, dest)` pairs
    fn stage(&self, files: Vec<(PathBuf, Vec<u8>)>) -> Result<Vec<(PathBuf, PathBuf)>, MlError> {
        let mut staged = Vec::with_capacity(files.len());
        for (dest, bytes) in files {
            let tmp = temp_path(&dest);
            if let Err(e) = fs::write(&tmp, &bytes) {
                // a failed write may still have created the file
                let _ = fs::remove_file(&tmp);
                discard(&staged);
                return Err(e.into());
            }
            staged.push((tmp, dest));
        }
        Ok(staged)
    }
}

/// Unique sibling of `dest`; concurrent writers of the same key never share one
fn temp_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("artifact");
    dest.with_file_name(format!("{name}.{}.tmp", uuid::Uuid::new_v4()))
}

fn discard(staged: &[(PathBuf, PathBuf)]) {
    for (tmp, _) in staged {
        if let Err(e) = fs::remove_file(tmp) {
            warn!(path = %tmp.display(), error = %e, "Failed to remove staged artifact");
        }
    }
}

impl ModelStore for FileModelStore {
    fn save_models(&self, artifacts: Vec<ModelArtifact>) -> Result<(), MlError> {
        let mut sidecars = Vec::with_capacity(artifacts.len());
        let mut models = Vec::with_capacity(artifacts.len());
        for artifact in &artifacts {
            let model_bytes = bincode::serialize(&artifact.model)
                .map_err(|e| MlError::Serialization(e.to_string()))?;
            let metrics_bytes = serde_json::to_vec_pretty(&artifact.metrics)
                .map_err(|e| MlError::Serialization(e.to_string()))?;
            sidecars.push((self.metrics_path(&artifact.key), metrics_bytes));
            models.push((self.model_path(&artifact.key), model_bytes));
        }

        // `.bin` files make a model visible, so they are renamed last
        sidecars.extend(models);
        let staged = self.stage(sidecars)?;

        for (i, (tmp, dest)) in staged.iter().enumerate() {
            if let Err(e) = fs::rename(tmp, dest) {
                discard(&staged[i..]);
                return Err(e.into());
            }
        }

        for artifact in &artifacts {
            info!(key = %artifact.key, model_id = %artifact.model.metadata.model_id, "Saved model");
        }
        Ok(())
    }

    fn load_model(&self, key: &str) -> Result<Option<Arc<dyn ForecastModel>>, MlError> {
        let path = self.model_path(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(key, "No model artifact on disk");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let model: TrainedModel = bincode::deserialize(&bytes)
            .map_err(|e| MlError::Serialization(format!("{}: {}", path.display(), e)))?;
        debug!(key, model_id = %model.metadata.model_id, "Loaded model");
        Ok(Some(Arc::new(model)))
    }

    fn load_metrics(&self, key: &str) -> Result<Option<ModelMetrics>, MlError> {
        let bytes = match fs::read(self.metrics_path(key)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let metrics = serde_json::from_slice(&bytes).map_err(|e| MlError::Serialization(e.to_string()))?;
        Ok(Some(metrics))
    }

    fn list_models(&self) -> Result<Vec<ModelInfo>, MlError> {
        let mut models = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(MODEL_EXTENSION) {
                continue;
            }
            let (Some(stem), Some(file)) = (
                path.file_stem().and_then(|s| s.to_str()),
                path.file_name().and_then(|s| s.to_str()),
            ) else {
                warn!(path = %path.display(), "Skipping artifact with non UTF-8 name");
                continue;
            };

            models.push(ModelInfo {
                name: stem.to_string(),
                algorithm: Algorithm::from_artifact_name(stem),
                has_metrics: self.metrics_path(stem).exists(),
                file: file.to_string(),
            });
        }
        models.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(models)
    }
}

/// Process-local store, used by tests and ephemeral deployments
#[derive(Default)]
pub struct InMemoryModelStore {
    models: RwLock<HashMap<String, Arc<dyn ForecastModel>>>,
    metrics: RwLock<HashMap<String, ModelMetrics>>,
}

impl InMemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an already-built model under `key`
    pub fn insert(&self, key: impl Into<String>, model: Arc<dyn ForecastModel>) {
        self.models.write().insert(key.into(), model);
    }

    pub fn len(&self) -> usize {
        self.models.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.read().is_empty()
    }
}

impl ModelStore for InMemoryModelStore {
    fn save_models(&self, artifacts: Vec<ModelArtifact>) -> Result<(), MlError> {
        let mut models = self.models.write();
        let mut metrics = self.metrics.write();
        for artifact in artifacts {
            metrics.insert(artifact.key.clone(), artifact.metrics);
            models.insert(artifact.key, Arc::new(artifact.model));
        }
        Ok(())
    }

    fn load_model(&self, key: &str) -> Result<Option<Arc<dyn ForecastModel>>, MlError> {
        Ok(self.models.read().get(key).cloned())
    }

    fn load_metrics(&self, key: &str) -> Result<Option<ModelMetrics>, MlError> {
        Ok(self.metrics.read().get(key).cloned())
    }

    fn list_models(&self) -> Result<Vec<ModelInfo>, MlError> {
        let metrics = self.metrics.read();
        let mut models: Vec<ModelInfo> = self
            .models
            .read()
            .keys()
            .map(|key| ModelInfo {
                name: key.clone(),
                algorithm: Algorithm::from_artifact_name(key),
                has_metrics: metrics.contains_key(key),
                file: format!("{key}.{MODEL_EXTENSION}"),
            })
            .collect();
        models.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(models)
    }
}
