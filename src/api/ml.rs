use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::error::ApiError;
use crate::app::AppState;
use crate::domain::{LocationSelector, PredictionRecord};
use crate::ml::{MlError, ModelInfo, ModelMetrics, TrainingResult};

const MAX_HOURS_AHEAD: u32 = 168;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub timestamp: DateTime<Utc>,
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "ml-service",
        timestamp: Utc::now(),
    })
}

#[derive(Debug, Deserialize, Validate)]
pub struct PredictRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "Location is required"))]
    pub location: String,
    #[validate(range(min = 1, max = 168))]
    pub hours_ahead: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub location: String,
    pub predictions: Vec<PredictionRecord>,
    pub generated_at: DateTime<Utc>,
}

/// POST /predict
pub async fn predict(
    State(state): State<AppState>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<PredictResponse>, ApiError> {
    request.validate()?;
    let location = request.location.trim().to_string();
    if location.is_empty() {
        return Err(ApiError::BadRequest("Location is required".to_string()));
    }

    let hours_ahead = request
        .hours_ahead
        .unwrap_or(state.cfg.ml.default_hours_ahead)
        .min(MAX_HOURS_AHEAD);
    let predictions = state.predictions.predict(&location, hours_ahead).await;

    Ok(Json(PredictResponse {
        location,
        predictions,
        generated_at: Utc::now(),
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct TrainRequest {
    pub location: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TrainResponse {
    #[serde(flatten)]
    pub result: TrainingResult,
    pub timestamp: DateTime<Utc>,
}

/// POST /train
pub async fn train(
    State(state): State<AppState>,
    body: Option<Json<TrainRequest>>,
) -> Result<Json<TrainResponse>, ApiError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let selector = request
        .location
        .as_deref()
        .map(LocationSelector::parse)
        .unwrap_or(LocationSelector::All);

    let result = state.trainer.train_all_models(&selector).await?;
    // retrained artifacts replace what the prediction service has cached
    state.predictions.clear_cache();

    Ok(Json(TrainResponse {
        result,
        timestamp: Utc::now(),
    }))
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelInfo>,
    pub count: usize,
}

/// GET /models
pub async fn list_models(State(state): State<AppState>) -> Result<Json<ModelsResponse>, ApiError> {
    let models = state.predictions.get_available_models()?;
    Ok(Json(ModelsResponse {
        count: models.len(),
        models,
    }))
}

/// GET /metrics/:model_name
pub async fn model_metrics(
    State(state): State<AppState>,
    Path(model_name): Path<String>,
) -> Result<Json<ModelMetrics>, ApiError> {
    state
        .trainer
        .get_model_metrics(&model_name)?
        .map(Json)
        .ok_or_else(|| MlError::ModelNotFound(model_name).into())
}
