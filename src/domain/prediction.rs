use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Which model produced a prediction record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ModelVariant {
    RandomForest,
    Xgboost,
    /// Arithmetic mean of the random forest and xgboost predictions
    Ensemble,
    /// The only model that produced a value for that hour
    SingleModel,
}

impl ModelVariant {
    /// Base confidence before the magnitude adjustment
    pub fn base_confidence(&self) -> f64 {
        match self {
            Self::Ensemble => 0.90,
            Self::Xgboost => 0.87,
            Self::RandomForest | Self::SingleModel => 0.85,
        }
    }
}

/// One forecast value for one location and one target hour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub location: String,
    pub prediction_made_at: DateTime<Utc>,
    pub target_timestamp: DateTime<Utc>,
    /// Always >= 0
    pub predicted_pm25: f64,
    /// Heuristic score in [0, 1]
    pub confidence: f64,
    pub model_name: ModelVariant,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_variant_names() {
        assert_eq!(ModelVariant::RandomForest.to_string(), "random_forest");
        assert_eq!(ModelVariant::Xgboost.as_ref(), "xgboost");
        assert_eq!(ModelVariant::SingleModel.to_string(), "single_model");
        assert_eq!(ModelVariant::from_str("ensemble").unwrap(), ModelVariant::Ensemble);
        assert_eq!(
            serde_json::to_string(&ModelVariant::SingleModel).unwrap(),
            "\"single_model\""
        );
    }
}
