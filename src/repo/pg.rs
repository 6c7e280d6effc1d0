//! Postgres measurement repository
//!
//! Reads the `measurements` table and writes the `predictions` table. Every
//! value reaches SQL as a bound parameter.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};

use super::MeasurementRepository;
use crate::domain::{LocationSelector, Measurement, PredictionRecord};

// Decimal columns are cast so they decode straight into f64
const HISTORY_QUERY: &str = r#"
    SELECT
        location_name,
        timestamp,
        latitude::float8 AS latitude,
        longitude::float8 AS longitude,
        temperature::float8 AS temperature,
        humidity::float8 AS humidity,
        pressure::float8 AS pressure,
        pm25::float8 AS pm25,
        pm10::float8 AS pm10,
        no2::float8 AS no2,
        so2::float8 AS so2,
        co::float8 AS co,
        o3::float8 AS o3,
        traffic_level
    FROM measurements
    WHERE timestamp >= $1
      AND ($2::text IS NULL OR location_name = $2)
    ORDER BY location_name, timestamp
"#;

#[derive(Debug, FromRow)]
struct MeasurementRow {
    location_name: String,
    timestamp: DateTime<Utc>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    temperature: Option<f64>,
    humidity: Option<f64>,
    pressure: Option<f64>,
    pm25: Option<f64>,
    pm10: Option<f64>,
    no2: Option<f64>,
    so2: Option<f64>,
    co: Option<f64>,
    o3: Option<f64>,
    traffic_level: Option<i32>,
}

impl From<MeasurementRow> for Measurement {
    fn from(row: MeasurementRow) -> Self {
        Measurement {
            location: row.location_name,
            timestamp: row.timestamp,
            latitude: row.latitude.unwrap_or_default(),
            longitude: row.longitude.unwrap_or_default(),
            pm25: row.pm25,
            pm10: row.pm10,
            no2: row.no2,
            so2: row.so2,
            co: row.co,
            o3: row.o3,
            temperature: row.temperature,
            humidity: row.humidity,
            pressure: row.pressure,
            // not stored in the measurements table
            wind_speed: None,
            traffic_level: row.traffic_level,
        }
    }
}

pub struct PgMeasurementRepository {
    pool: PgPool,
}

impl PgMeasurementRepository {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MeasurementRepository for PgMeasurementRepository {
    async fn fetch_history(
        &self,
        selector: &LocationSelector,
        window: chrono::Duration,
    ) -> Result<Vec<Measurement>> {
        let since = Utc::now() - window;
        let rows: Vec<MeasurementRow> = sqlx::query_as(HISTORY_QUERY)
            .bind(since)
            .bind(selector.location())
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Measurement::from).collect())
    }

    async fn persist_predictions(&self, records: &[PredictionRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(
                r#"
                INSERT INTO predictions
                    (location_name, prediction_timestamp, target_timestamp,
                     predicted_pm25, confidence_score, model_name, created_at)
                VALUES ($1, $2, $3, $4::float8::numeric, $5::float8::numeric, $6, NOW())
                "#,
            )
            .bind(&record.location)
            .bind(record.prediction_made_at)
            .bind(record.target_timestamp)
            .bind(record.predicted_pm25)
            .bind(record.confidence)
            .bind(record.model_name.to_string())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
