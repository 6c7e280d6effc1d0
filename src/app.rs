use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::domain::LocationSelector;
use crate::ml::{FileModelStore, ModelStore, ModelTrainer, PredictionService, TrainingConfig};
use crate::repo::{fetch_history_with_timeout, InMemoryRepository, MeasurementRepository};

#[derive(Clone)]
pub struct AppState {
    pub cfg: Config,
    pub repo: Arc<dyn MeasurementRepository>,
    pub predictions: Arc<PredictionService>,
    pub trainer: Arc<ModelTrainer>,
}

impl AppState {
    pub async fn new(cfg: Config) -> Result<Self> {
        let repo = connect_repository(&cfg).await?;
        let store: Arc<dyn ModelStore> = Arc::new(FileModelStore::new(&cfg.ml.model_dir)?);
        info!(model_dir = %cfg.ml.model_dir.display(), "Model directory ready");
        Ok(Self::with_components(cfg, repo, store))
    }

    pub fn with_components(
        cfg: Config,
        repo: Arc<dyn MeasurementRepository>,
        store: Arc<dyn ModelStore>,
    ) -> Self {
        let predictions = Arc::new(PredictionService::new(repo.clone(), store.clone(), &cfg.ml));
        let trainer = Arc::new(ModelTrainer::new(
            repo.clone(),
            store,
            TrainingConfig::from_ml_config(&cfg.ml),
        ));
        Self {
            cfg,
            repo,
            predictions,
            trainer,
        }
    }

    /// Train every location with enough recent history, then report what is loaded.
    ///
    /// Failures are logged; the service starts regardless.
    pub async fn bootstrap(&self) {
        info!("Initializing ML service");

        if self.cfg.ml.train_on_startup {
            self.train_recent_locations().await;
        }

        match self.predictions.get_available_models() {
            Ok(models) => {
                info!(count = models.len(), "Available models");
                for model in &models {
                    info!(name = %model.name, algorithm = %model.algorithm, "Model available");
                }
            }
            Err(e) => error!(error = %e, "Error listing models"),
        }
        info!("ML service initialization completed");
    }

    async fn train_recent_locations(&self) {
        let history = fetch_history_with_timeout(
            self.repo.as_ref(),
            &LocationSelector::All,
            self.cfg.ml.bootstrap_window(),
            self.cfg.ml.fetch_timeout(),
        )
        .await;
        if history.is_empty() {
            warn!("No training data available, run data collection first");
            return;
        }
        info!(rows = history.len(), "Found training samples");

        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for m in &history {
            *counts.entry(m.location.as_str()).or_default() += 1;
        }

        for (location, count) in counts {
            if count < self.cfg.ml.min_training_rows {
                warn!(location, samples = count, "Insufficient data for startup training");
                continue;
            }
            info!(location, samples = count, "Training models at startup");
            match self
                .trainer
                .train_all_models(&LocationSelector::named(location))
                .await
            {
                Ok(result) => info!(location, status = %result.status, "Startup training completed"),
                Err(e) => error!(location, error = %e, "Startup training failed"),
            }
        }
        self.predictions.clear_cache();
    }
}

#[cfg_attr(not(feature = "db"), allow(unused_variables))]
async fn connect_repository(cfg: &Config) -> Result<Arc<dyn MeasurementRepository>> {
    #[cfg(feature = "db")]
    {
        if !cfg.db.url.is_empty() {
            let repo = crate::repo::PgMeasurementRepository::connect(&cfg.db.url).await?;
            info!("Connected to measurement database");
            return Ok(Arc::new(repo));
        }
    }

    warn!("No database configured, using in-memory measurement repository");
    Ok(Arc::new(InMemoryRepository::new()))
}
