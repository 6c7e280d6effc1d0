//! Measurement history source and prediction sink

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::domain::{LocationSelector, Measurement, PredictionRecord};

#[cfg(feature = "db")]
pub mod pg;

#[cfg(feature = "db")]
pub use pg::PgMeasurementRepository;

/// Where measurement history comes from and where predictions go
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MeasurementRepository: Send + Sync {
    /// Readings inside `window`, ascending by timestamp within each location
    async fn fetch_history(
        &self,
        selector: &LocationSelector,
        window: chrono::Duration,
    ) -> Result<Vec<Measurement>>;

    async fn persist_predictions(&self, records: &[PredictionRecord]) -> Result<()>;
}

/// Fetch history, treating a timeout or repository error as "no data"
pub async fn fetch_history_with_timeout(
    repo: &dyn MeasurementRepository,
    selector: &LocationSelector,
    window: chrono::Duration,
    timeout: Duration,
) -> Vec<Measurement> {
    match tokio::time::timeout(timeout, repo.fetch_history(selector, window)).await {
        Ok(Ok(rows)) => {
            debug!(selector = %selector, rows = rows.len(), "Fetched measurement history");
            rows
        }
        Ok(Err(e)) => {
            warn!(selector = %selector, error = %e, "Measurement fetch failed");
            Vec::new()
        }
        Err(_) => {
            warn!(selector = %selector, timeout_ms = timeout.as_millis() as u64, "Measurement fetch timed out");
            Vec::new()
        }
    }
}

/// Process-local repository for tests, demos and local runs
#[derive(Default)]
pub struct InMemoryRepository {
    measurements: RwLock<Vec<Measurement>>,
    predictions: RwLock<Vec<PredictionRecord>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_measurements(measurements: Vec<Measurement>) -> Self {
        Self {
            measurements: RwLock::new(measurements),
            predictions: RwLock::new(Vec::new()),
        }
    }

    /// Every prediction persisted so far
    pub fn predictions(&self) -> Vec<PredictionRecord> {
        self.predictions.read().clone()
    }
}

#[async_trait]
impl MeasurementRepository for InMemoryRepository {
    async fn fetch_history(
        &self,
        selector: &LocationSelector,
        window: chrono::Duration,
    ) -> Result<Vec<Measurement>> {
        let measurements = self.measurements.read();

        // The window ends at the newest stored reading, not at the wall clock
        let newest: Option<DateTime<Utc>> = measurements
            .iter()
            .filter(|m| selector.matches(&m.location))
            .map(|m| m.timestamp)
            .max();
        let Some(newest) = newest else {
            return Ok(Vec::new());
        };
        let cutoff = newest - window;

        let mut rows: Vec<Measurement> = measurements
            .iter()
            .filter(|m| selector.matches(&m.location) && m.timestamp >= cutoff)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.location
                .cmp(&b.location)
                .then_with(|| a.timestamp.cmp(&b.timestamp))
        });
        Ok(rows)
    }

    async fn persist_predictions(&self, records: &[PredictionRecord]) -> Result<()> {
        self.predictions.write().extend_from_slice(records);
        Ok(())
    }
}
