//! Feature engineering for PM2.5 forecasting
//!
//! Turns raw measurement history into per-row feature vectors: calendar and
//! cyclical encodings, lags, trailing rolling statistics, weather
//! interactions and change rates.
//!
//! Lags and rolling windows are positional (N rows back after sorting), never
//! wall-clock offsets, and are always computed inside a single location's
//! partition. A value that has no input inside the partition stays `None`
//! until [`FeatureEngineer::prepare_for_prediction`] fills it.

use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Timelike, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumCount, EnumIter, EnumString};

use crate::domain::Measurement;

/// Every column a feature table can carry
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
    Display, AsRefStr, EnumString, EnumIter, EnumCount, Serialize, Deserialize,
)]
#[serde(into = "String", try_from = "String")]
pub enum FeatureColumn {
    // Raw measurement fields
    #[strum(serialize = "pm25")]
    Pm25,
    #[strum(serialize = "pm10")]
    Pm10,
    #[strum(serialize = "no2")]
    No2,
    #[strum(serialize = "so2")]
    So2,
    #[strum(serialize = "co")]
    Co,
    #[strum(serialize = "o3")]
    O3,
    #[strum(serialize = "temperature")]
    Temperature,
    #[strum(serialize = "humidity")]
    Humidity,
    #[strum(serialize = "pressure")]
    Pressure,
    #[strum(serialize = "wind_speed")]
    WindSpeed,
    #[strum(serialize = "traffic_level")]
    TrafficLevel,
    #[strum(serialize = "latitude")]
    Latitude,
    #[strum(serialize = "longitude")]
    Longitude,

    // Calendar
    #[strum(serialize = "hour")]
    Hour,
    #[strum(serialize = "day_of_week")]
    DayOfWeek,
    #[strum(serialize = "month")]
    Month,
    #[strum(serialize = "is_weekend")]
    IsWeekend,
    #[strum(serialize = "season")]
    Season,
    #[strum(serialize = "day_of_year")]
    DayOfYear,

    // Cyclical encodings
    #[strum(serialize = "hour_sin")]
    HourSin,
    #[strum(serialize = "hour_cos")]
    HourCos,
    #[strum(serialize = "day_sin")]
    DaySin,
    #[strum(serialize = "day_cos")]
    DayCos,

    // Lags
    #[strum(serialize = "pm25_lag_1h")]
    Pm25Lag1h,
    #[strum(serialize = "pm25_lag_3h")]
    Pm25Lag3h,
    #[strum(serialize = "pm25_lag_6h")]
    Pm25Lag6h,
    #[strum(serialize = "pm25_lag_12h")]
    Pm25Lag12h,
    #[strum(serialize = "pm25_lag_24h")]
    Pm25Lag24h,
    #[strum(serialize = "temp_lag_1h")]
    TempLag1h,
    #[strum(serialize = "humidity_lag_1h")]
    HumidityLag1h,

    // Rolling statistics
    #[strum(serialize = "pm25_rolling_mean_3h")]
    Pm25RollingMean3h,
    #[strum(serialize = "pm25_rolling_mean_6h")]
    Pm25RollingMean6h,
    #[strum(serialize = "pm25_rolling_mean_12h")]
    Pm25RollingMean12h,
    #[strum(serialize = "pm25_rolling_std_6h")]
    Pm25RollingStd6h,
    #[strum(serialize = "pm25_rolling_max_6h")]
    Pm25RollingMax6h,
    #[strum(serialize = "pm25_rolling_min_6h")]
    Pm25RollingMin6h,
    #[strum(serialize = "temp_rolling_mean_6h")]
    TempRollingMean6h,
    #[strum(serialize = "humidity_rolling_mean_6h")]
    HumidityRollingMean6h,

    // Interactions
    #[strum(serialize = "temp_humidity_interaction")]
    TempHumidityInteraction,
    #[strum(serialize = "temp_pressure_interaction")]
    TempPressureInteraction,
    #[strum(serialize = "wind_pollution_interaction")]
    WindPollutionInteraction,

    // Change rates
    #[strum(serialize = "pm25_change_1h")]
    Pm25Change1h,
    #[strum(serialize = "pm25_change_3h")]
    Pm25Change3h,
}

impl FeatureColumn {
    fn index(self) -> usize {
        self as usize
    }
}

impl From<FeatureColumn> for String {
    fn from(column: FeatureColumn) -> Self {
        column.as_ref().to_string()
    }
}

impl TryFrom<String> for FeatureColumn {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        FeatureColumn::from_str(&value)
    }
}

/// Canonical model inputs, in the order models are fitted on.
///
/// `pm25` itself is the target and never an input.
pub const FEATURE_COLUMNS: &[FeatureColumn] = &[
    FeatureColumn::Temperature,
    FeatureColumn::Humidity,
    FeatureColumn::Pressure,
    FeatureColumn::Pm10,
    FeatureColumn::No2,
    FeatureColumn::So2,
    FeatureColumn::Co,
    FeatureColumn::O3,
    FeatureColumn::Hour,
    FeatureColumn::DayOfWeek,
    FeatureColumn::Month,
    FeatureColumn::IsWeekend,
    FeatureColumn::Season,
    FeatureColumn::Pm25Lag1h,
    FeatureColumn::Pm25Lag3h,
    FeatureColumn::Pm25Lag6h,
    FeatureColumn::Pm25Lag12h,
    FeatureColumn::Pm25Lag24h,
    FeatureColumn::TempLag1h,
    FeatureColumn::HumidityLag1h,
    FeatureColumn::Pm25RollingMean3h,
    FeatureColumn::Pm25RollingMean6h,
    FeatureColumn::Pm25RollingMean12h,
    FeatureColumn::Pm25RollingStd6h,
    FeatureColumn::Pm25RollingMax6h,
    FeatureColumn::Pm25RollingMin6h,
    FeatureColumn::TempRollingMean6h,
    FeatureColumn::HumidityRollingMean6h,
    FeatureColumn::Pm25Change1h,
    FeatureColumn::Pm25Change3h,
    FeatureColumn::TempHumidityInteraction,
    FeatureColumn::TempPressureInteraction,
    FeatureColumn::WindPollutionInteraction,
    FeatureColumn::HourSin,
    FeatureColumn::HourCos,
    FeatureColumn::DaySin,
    FeatureColumn::DayCos,
    FeatureColumn::TrafficLevel,
];

/// One (location, timestamp) row of the feature table
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub location: String,
    pub timestamp: DateTime<Utc>,
    values: Vec<Option<f64>>,
}

impl FeatureRow {
    pub fn new(location: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            location: location.into(),
            timestamp,
            values: vec![None; FeatureColumn::COUNT],
        }
    }

    fn from_measurement(m: &Measurement) -> Self {
        let mut row = Self::new(m.location.clone(), m.timestamp);
        row.set(FeatureColumn::Pm25, m.pm25);
        row.set(FeatureColumn::Pm10, m.pm10);
        row.set(FeatureColumn::No2, m.no2);
        row.set(FeatureColumn::So2, m.so2);
        row.set(FeatureColumn::Co, m.co);
        row.set(FeatureColumn::O3, m.o3);
        row.set(FeatureColumn::Temperature, m.temperature);
        row.set(FeatureColumn::Humidity, m.humidity);
        row.set(FeatureColumn::Pressure, m.pressure);
        row.set(FeatureColumn::WindSpeed, m.wind_speed);
        row.set(FeatureColumn::TrafficLevel, m.traffic_level.map(f64::from));
        row.set(FeatureColumn::Latitude, Some(m.latitude));
        row.set(FeatureColumn::Longitude, Some(m.longitude));
        row.apply_calendar(m.timestamp);
        row
    }

    pub fn get(&self, column: FeatureColumn) -> Option<f64> {
        self.values[column.index()]
    }

    pub fn set(&mut self, column: FeatureColumn, value: Option<f64>) {
        self.values[column.index()] = value;
    }

    /// Move the row to `at`, recomputing every calendar and cyclical column.
    ///
    /// Lag, rolling, interaction and change columns are left untouched.
    pub fn apply_calendar(&mut self, at: DateTime<Utc>) {
        let hour = at.hour();
        let day_of_week = at.weekday().num_days_from_monday();
        let month = at.month();
        let day_of_year = at.ordinal();

        self.timestamp = at;
        self.set(FeatureColumn::Hour, Some(f64::from(hour)));
        self.set(FeatureColumn::DayOfWeek, Some(f64::from(day_of_week)));
        self.set(FeatureColumn::Month, Some(f64::from(month)));
        self.set(FeatureColumn::IsWeekend, Some(if day_of_week >= 5 { 1.0 } else { 0.0 }));
        self.set(FeatureColumn::Season, Some(f64::from(season(month))));
        self.set(FeatureColumn::DayOfYear, Some(f64::from(day_of_year)));

        let hour_angle = 2.0 * PI * f64::from(hour) / 24.0;
        let day_angle = 2.0 * PI * f64::from(day_of_year) / 365.0;
        self.set(FeatureColumn::HourSin, Some(hour_angle.sin()));
        self.set(FeatureColumn::HourCos, Some(hour_angle.cos()));
        self.set(FeatureColumn::DaySin, Some(day_angle.sin()));
        self.set(FeatureColumn::DayCos, Some(day_angle.cos()));
    }
}

/// Season from month (0=winter, 1=spring, 2=summer, 3=fall)
pub fn season(month: u32) -> u32 {
    match month {
        12 | 1 | 2 => 0,
        3..=5 => 1,
        6..=8 => 2,
        _ => 3,
    }
}

/// Rows grouped by location, each group ascending by timestamp
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTable {
    rows: Vec<FeatureRow>,
}

impl FeatureTable {
    pub fn from_rows(rows: Vec<FeatureRow>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn column(&self, column: FeatureColumn) -> Vec<Option<f64>> {
        self.rows.iter().map(|r| r.get(column)).collect()
    }

    /// A column is present when at least one row holds a finite value for it
    pub fn has_column(&self, column: FeatureColumn) -> bool {
        self.rows
            .iter()
            .any(|r| r.get(column).is_some_and(f64::is_finite))
    }

    /// Distinct locations in table order
    pub fn locations(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.location.as_str()).unique().collect()
    }

    pub fn for_location(&self, location: &str) -> FeatureTable {
        Self::from_rows(
            self.rows
                .iter()
                .filter(|r| r.location == location)
                .cloned()
                .collect(),
        )
    }

    /// Most recent row of a location
    pub fn last_for(&self, location: &str) -> Option<&FeatureRow> {
        self.rows.iter().rev().find(|r| r.location == location)
    }

    /// Keep only rows where `column` holds a finite value
    pub fn drop_missing(&self, column: FeatureColumn) -> FeatureTable {
        Self::from_rows(
            self.rows
                .iter()
                .filter(|r| r.get(column).is_some_and(f64::is_finite))
                .cloned()
                .collect(),
        )
    }

    /// Replace missing or non-finite values in `columns` with the column mean
    pub fn mean_fill(&mut self, columns: &[FeatureColumn]) {
        for &column in columns {
            let observed: Vec<f64> = self
                .rows
                .iter()
                .filter_map(|r| r.get(column))
                .filter(|v| v.is_finite())
                .collect();
            if observed.is_empty() {
                continue;
            }
            let mean = observed.iter().sum::<f64>() / observed.len() as f64;
            for row in &mut self.rows {
                if !row.get(column).is_some_and(f64::is_finite) {
                    row.set(column, Some(mean));
                }
            }
        }
    }

    /// Dense matrix over `columns`; anything still missing becomes 0
    pub fn to_matrix(&self, columns: &[FeatureColumn]) -> FeatureMatrix {
        let data = self
            .rows
            .iter()
            .map(|r| {
                columns
                    .iter()
                    .map(|&c| r.get(c).filter(|v| v.is_finite()).unwrap_or(0.0))
                    .collect()
            })
            .collect();
        FeatureMatrix::new(columns.to_vec(), data)
    }
}

/// Row-major numeric matrix with a fixed column order
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    columns: Vec<FeatureColumn>,
    data: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    pub fn new(columns: Vec<FeatureColumn>, data: Vec<Vec<f64>>) -> Self {
        Self { columns, data }
    }

    pub fn columns(&self) -> &[FeatureColumn] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.data
    }

    pub fn nrows(&self) -> usize {
        self.data.len()
    }

    pub fn value(&self, row: usize, column: FeatureColumn) -> Option<f64> {
        let idx = self.columns.iter().position(|&c| c == column)?;
        self.data.get(row).map(|r| r[idx])
    }
}

/// Outcome of negotiating the canonical column list against a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedColumns {
    /// Canonical columns present in the table, in canonical order
    pub columns: Vec<FeatureColumn>,
    /// Canonical columns the table does not carry
    pub missing: Vec<FeatureColumn>,
}

impl fmt::Display for ResolvedColumns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} usable, missing [{}]",
            self.columns.len(),
            self.missing.iter().join(", ")
        )
    }
}

#[derive(Debug, Clone, Copy)]
enum RollingStat {
    Mean,
    Std,
    Max,
    Min,
}

/// Stateless feature builder shared by training and inference
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureEngineer;

impl FeatureEngineer {
    pub fn new() -> Self {
        Self
    }

    /// Build the feature table for measurements spanning any number of locations.
    ///
    /// Output is grouped by location (lexicographic) and ascending by
    /// timestamp within each group.
    pub fn create_features(&self, measurements: &[Measurement]) -> FeatureTable {
        let mut partitions: BTreeMap<&str, Vec<&Measurement>> = BTreeMap::new();
        for m in measurements {
            partitions.entry(m.location.as_str()).or_default().push(m);
        }

        let mut rows = Vec::with_capacity(measurements.len());
        for (_, mut partition) in partitions {
            partition.sort_by_key(|m| m.timestamp);
            rows.extend(engineer_partition(&partition));
        }
        FeatureTable::from_rows(rows)
    }

    /// Project `table` onto exactly `feature_columns`, in that order.
    ///
    /// Missing values are forward- then backward-filled per column, columns
    /// the table never carries are zero, and infinities become zero.
    pub fn prepare_for_prediction(
        &self,
        table: &FeatureTable,
        feature_columns: &[FeatureColumn],
    ) -> FeatureMatrix {
        let mut data: Vec<Vec<f64>> = vec![Vec::with_capacity(feature_columns.len()); table.len()];
        for &column in feature_columns {
            for (row, value) in data.iter_mut().zip(fill_column(table.column(column))) {
                row.push(value);
            }
        }
        FeatureMatrix::new(feature_columns.to_vec(), data)
    }

    /// Intersect the canonical column list with what `table` actually carries
    pub fn resolve_columns(&self, table: &FeatureTable) -> ResolvedColumns {
        let (columns, missing): (Vec<FeatureColumn>, Vec<FeatureColumn>) = FEATURE_COLUMNS
            .iter()
            .copied()
            .partition(|&c| table.has_column(c));
        ResolvedColumns { columns, missing }
    }
}

fn engineer_partition(partition: &[&Measurement]) -> Vec<FeatureRow> {
    use FeatureColumn::*;

    let mut rows: Vec<FeatureRow> = partition.iter().map(|m| FeatureRow::from_measurement(m)).collect();
    let pm25: Vec<Option<f64>> = rows.iter().map(|r| r.get(Pm25)).collect();
    let temp: Vec<Option<f64>> = rows.iter().map(|r| r.get(Temperature)).collect();
    let humidity: Vec<Option<f64>> = rows.iter().map(|r| r.get(Humidity)).collect();

    for (i, row) in rows.iter_mut().enumerate() {
        row.set(Pm25Lag1h, lag(&pm25, i, 1));
        row.set(Pm25Lag3h, lag(&pm25, i, 3));
        row.set(Pm25Lag6h, lag(&pm25, i, 6));
        row.set(Pm25Lag12h, lag(&pm25, i, 12));
        row.set(Pm25Lag24h, lag(&pm25, i, 24));
        row.set(TempLag1h, lag(&temp, i, 1));
        row.set(HumidityLag1h, lag(&humidity, i, 1));

        row.set(Pm25RollingMean3h, rolling(&pm25, i, 3, RollingStat::Mean));
        row.set(Pm25RollingMean6h, rolling(&pm25, i, 6, RollingStat::Mean));
        row.set(Pm25RollingMean12h, rolling(&pm25, i, 12, RollingStat::Mean));
        row.set(Pm25RollingStd6h, rolling(&pm25, i, 6, RollingStat::Std));
        row.set(Pm25RollingMax6h, rolling(&pm25, i, 6, RollingStat::Max));
        row.set(Pm25RollingMin6h, rolling(&pm25, i, 6, RollingStat::Min));
        row.set(TempRollingMean6h, rolling(&temp, i, 6, RollingStat::Mean));
        row.set(HumidityRollingMean6h, rolling(&humidity, i, 6, RollingStat::Mean));

        let t = row.get(Temperature);
        let h = row.get(Humidity);
        let p = row.get(Pressure);
        let wind = row.get(WindSpeed);
        let pm = row.get(Pm25);
        row.set(TempHumidityInteraction, t.zip(h).map(|(t, h)| t * h / 100.0));
        row.set(TempPressureInteraction, t.zip(p).map(|(t, p)| t * p / 1000.0));
        row.set(
            WindPollutionInteraction,
            Some(wind.zip(pm).map(|(w, pm)| w * pm).unwrap_or(0.0)),
        );

        row.set(Pm25Change1h, pm.zip(row.get(Pm25Lag1h)).map(|(a, b)| a - b));
        row.set(Pm25Change3h, pm.zip(row.get(Pm25Lag3h)).map(|(a, b)| a - b));
    }

    rows
}

/// Value `n` positions back in the same partition
fn lag(series: &[Option<f64>], i: usize, n: usize) -> Option<f64> {
    if i >= n {
        series[i - n]
    } else {
        None
    }
}

/// Trailing window of up to `window` rows ending at `i`, min one observation
fn rolling(series: &[Option<f64>], i: usize, window: usize, stat: RollingStat) -> Option<f64> {
    let start = (i + 1).saturating_sub(window);
    let values: Vec<f64> = series[start..=i]
        .iter()
        .flatten()
        .copied()
        .filter(|v| !v.is_nan())
        .collect();
    if values.is_empty() {
        return None;
    }

    let n = values.len() as f64;
    match stat {
        RollingStat::Mean => Some(values.iter().sum::<f64>() / n),
        RollingStat::Std => {
            // Sample standard deviation; undefined for a single observation
            if values.len() < 2 {
                return None;
            }
            let mean = values.iter().sum::<f64>() / n;
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
            Some(var.sqrt())
        }
        RollingStat::Max => Some(values.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b))),
        RollingStat::Min => Some(values.iter().fold(f64::INFINITY, |a, &b| a.min(b))),
    }
}

fn fill_column(values: Vec<Option<f64>>) -> Vec<f64> {
    let mut values: Vec<Option<f64>> = values
        .into_iter()
        .map(|v| v.filter(|x| !x.is_nan()))
        .collect();

    let mut carry = None;
    for v in values.iter_mut() {
        match v {
            Some(_) => carry = *v,
            None => *v = carry,
        }
    }
    let mut carry = None;
    for v in values.iter_mut().rev() {
        match v {
            Some(_) => carry = *v,
            None => *v = carry,
        }
    }

    values
        .into_iter()
        .map(|v| v.filter(|x| x.is_finite()).unwrap_or(0.0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_model_inputs_exclude_target_position_and_day_of_year() {
        let excluded: Vec<FeatureColumn> = FeatureColumn::iter()
            .filter(|c| !FEATURE_COLUMNS.contains(c))
            .collect();
        assert_eq!(
            excluded,
            vec![
                FeatureColumn::Pm25,
                FeatureColumn::WindSpeed,
                FeatureColumn::Latitude,
                FeatureColumn::Longitude,
                FeatureColumn::DayOfYear,
            ]
        );
    }

    fn base_time() -> DateTime<Utc> {
        // Monday
        Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap()
    }

    fn hourly(location: &str, pm25: &[Option<f64>]) -> Vec<Measurement> {
        pm25.iter()
            .enumerate()
            .map(|(i, &v)| {
                let mut m = Measurement::new(location, base_time() + Duration::hours(i as i64));
                m.pm25 = v;
                m.temperature = Some(10.0 + i as f64);
                m.humidity = Some(60.0);
                m.pressure = Some(1010.0);
                m
            })
            .collect()
    }

    #[test]
    fn test_empty_input() {
        let table = FeatureEngineer::new().create_features(&[]);
        assert!(table.is_empty());
        assert!(table.locations().is_empty());
    }

    #[test]
    fn test_sorts_each_partition() {
        let mut rows = hourly("A", &[Some(1.0), Some(2.0), Some(3.0)]);
        rows.reverse();
        let table = FeatureEngineer::new().create_features(&rows);

        let pm25 = table.column(FeatureColumn::Pm25);
        assert_eq!(pm25, vec![Some(1.0), Some(2.0), Some(3.0)]);
        assert!(table.rows().windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_lag_correctness() {
        let values: Vec<Option<f64>> = (0..30).map(|i| Some(i as f64 * 2.0)).collect();
        let table = FeatureEngineer::new().create_features(&hourly("A", &values));
        let rows = table.rows();

        assert_eq!(rows[0].get(FeatureColumn::Pm25Lag1h), None);
        for k in 1..rows.len() {
            assert_eq!(rows[k].get(FeatureColumn::Pm25Lag1h), rows[k - 1].get(FeatureColumn::Pm25));
        }
        assert_eq!(rows[23].get(FeatureColumn::Pm25Lag24h), None);
        assert_eq!(rows[24].get(FeatureColumn::Pm25Lag24h), Some(0.0));
        assert_eq!(rows[5].get(FeatureColumn::TempLag1h), Some(14.0));
    }

    #[test]
    fn test_rolling_min_periods_one() {
        let table = FeatureEngineer::new().create_features(&hourly("A", &[Some(12.0), Some(18.0)]));
        let first = &table.rows()[0];

        assert_eq!(first.get(FeatureColumn::Pm25RollingMean3h), Some(12.0));
        assert_eq!(first.get(FeatureColumn::Pm25RollingMax6h), Some(12.0));
        assert_eq!(first.get(FeatureColumn::Pm25RollingMin6h), Some(12.0));
        assert_eq!(first.get(FeatureColumn::Pm25RollingStd6h), None);

        let second = &table.rows()[1];
        assert_eq!(second.get(FeatureColumn::Pm25RollingMean3h), Some(15.0));
        let std = second.get(FeatureColumn::Pm25RollingStd6h).unwrap();
        assert!((std - 18.0_f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_rolling_skips_missing_values() {
        let table = FeatureEngineer::new().create_features(&hourly("A", &[Some(10.0), None, Some(20.0)]));
        let rows = table.rows();

        assert_eq!(rows[1].get(FeatureColumn::Pm25RollingMean3h), Some(10.0));
        assert_eq!(rows[2].get(FeatureColumn::Pm25RollingMean3h), Some(15.0));
        assert_eq!(rows[2].get(FeatureColumn::Pm25Lag1h), None);
        assert_eq!(rows[2].get(FeatureColumn::Pm25Change1h), None);
    }

    #[test]
    fn test_rolling_mean_6h_over_200_rows() {
        let values: Vec<Option<f64>> = (0..200).map(|i| Some(10.0 + ((i * 7) % 71) as f64)).collect();
        let table = FeatureEngineer::new().create_features(&hourly("A", &values));
        let rows = table.rows();

        let expected = (194..200).map(|i| values[i].unwrap()).sum::<f64>() / 6.0;
        let actual = rows[199].get(FeatureColumn::Pm25RollingMean6h).unwrap();
        assert!((actual - expected).abs() < 1e-9);
    }

    #[test]
    fn test_calendar_features() {
        // Saturday 2024-07-06 15:00
        let at = Utc.with_ymd_and_hms(2024, 7, 6, 15, 0, 0).unwrap();
        let mut row = FeatureRow::new("A", base_time());
        row.apply_calendar(at);

        assert_eq!(row.timestamp, at);
        assert_eq!(row.get(FeatureColumn::Hour), Some(15.0));
        assert_eq!(row.get(FeatureColumn::DayOfWeek), Some(5.0));
        assert_eq!(row.get(FeatureColumn::Month), Some(7.0));
        assert_eq!(row.get(FeatureColumn::IsWeekend), Some(1.0));
        assert_eq!(row.get(FeatureColumn::Season), Some(2.0));
        assert_eq!(row.get(FeatureColumn::DayOfYear), Some(188.0));

        let hour_sin = row.get(FeatureColumn::HourSin).unwrap();
        assert!((hour_sin - (2.0 * PI * 15.0 / 24.0).sin()).abs() < 1e-12);
        let day_cos = row.get(FeatureColumn::DayCos).unwrap();
        assert!((day_cos - (2.0 * PI * 188.0 / 365.0).cos()).abs() < 1e-12);
    }

    #[test]
    fn test_season_calculation() {
        assert_eq!(season(1), 0);
        assert_eq!(season(12), 0);
        assert_eq!(season(4), 1);
        assert_eq!(season(7), 2);
        assert_eq!(season(10), 3);
    }

    #[test]
    fn test_interactions_and_changes() {
        let mut rows = hourly("A", &[Some(10.0), Some(14.0), Some(15.0), Some(19.0)]);
        rows[3].wind_speed = Some(2.5);
        let table = FeatureEngineer::new().create_features(&rows);
        let last = &table.rows()[3];

        assert_eq!(last.get(FeatureColumn::TempHumidityInteraction), Some(13.0 * 60.0 / 100.0));
        assert_eq!(last.get(FeatureColumn::TempPressureInteraction), Some(13.0 * 1010.0 / 1000.0));
        assert_eq!(last.get(FeatureColumn::WindPollutionInteraction), Some(2.5 * 19.0));
        assert_eq!(last.get(FeatureColumn::Pm25Change1h), Some(4.0));
        assert_eq!(last.get(FeatureColumn::Pm25Change3h), Some(9.0));

        // No wind reading: the interaction is zero rather than missing
        let first = &table.rows()[0];
        assert_eq!(first.get(FeatureColumn::WindPollutionInteraction), Some(0.0));
        assert_eq!(first.get(FeatureColumn::Pm25Change1h), None);
    }

    #[test]
    fn test_missing_weather_leaves_interaction_missing() {
        let rows = vec![Measurement::new("A", base_time()).with_pm25(20.0)];
        let table = FeatureEngineer::new().create_features(&rows);

        assert_eq!(table.rows()[0].get(FeatureColumn::TempHumidityInteraction), None);
        assert_eq!(table.rows()[0].get(FeatureColumn::TempRollingMean6h), None);
    }

    #[test]
    fn test_prepare_fills_forward_then_backward() {
        let values = [None, Some(5.0), None, Some(f64::INFINITY), None];
        let rows: Vec<FeatureRow> = values
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                let mut r = FeatureRow::new("A", base_time() + Duration::hours(i as i64));
                r.set(FeatureColumn::Pm25Lag1h, v);
                r
            })
            .collect();
        let table = FeatureTable::from_rows(rows);

        let matrix = FeatureEngineer::new()
            .prepare_for_prediction(&table, &[FeatureColumn::Pm25Lag1h, FeatureColumn::No2]);

        assert_eq!(matrix.columns(), &[FeatureColumn::Pm25Lag1h, FeatureColumn::No2]);
        let lag: Vec<f64> = matrix.rows().iter().map(|r| r[0]).collect();
        assert_eq!(lag, vec![5.0, 5.0, 5.0, 0.0, 0.0]);
        assert!(matrix.rows().iter().all(|r| r[1] == 0.0));
    }

    #[test]
    fn test_resolve_columns() {
        let table = FeatureEngineer::new().create_features(&hourly("A", &[Some(1.0), Some(2.0)]));
        let resolved = FeatureEngineer::new().resolve_columns(&table);

        assert!(resolved.columns.contains(&FeatureColumn::Temperature));
        assert!(resolved.columns.contains(&FeatureColumn::Pm25Lag1h));
        assert!(resolved.missing.contains(&FeatureColumn::TrafficLevel));
        assert!(resolved.missing.contains(&FeatureColumn::Pm25Lag24h));
        assert!(!resolved.columns.contains(&FeatureColumn::Pm25));
        assert_eq!(resolved.columns.len() + resolved.missing.len(), FEATURE_COLUMNS.len());

        // Canonical order is kept
        let positions: Vec<usize> = resolved
            .columns
            .iter()
            .map(|c| FEATURE_COLUMNS.iter().position(|f| f == c).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_mean_fill() {
        let mut table = FeatureEngineer::new().create_features(&hourly("A", &[Some(2.0), Some(4.0), Some(9.0)]));
        table.mean_fill(&[FeatureColumn::Pm25Lag1h]);

        // lag values are [None, 2, 4]
        assert_eq!(table.rows()[0].get(FeatureColumn::Pm25Lag1h), Some(3.0));
        assert_eq!(table.rows()[2].get(FeatureColumn::Pm25Lag1h), Some(4.0));
    }

    #[test]
    fn test_column_names_round_trip_through_serde() {
        let json = serde_json::to_string(&FeatureColumn::Pm25RollingStd6h).unwrap();
        assert_eq!(json, "\"pm25_rolling_std_6h\"");
        let back: FeatureColumn = serde_json::from_str("\"pm25_lag_24h\"").unwrap();
        assert_eq!(back, FeatureColumn::Pm25Lag24h);
    }

    fn lag_and_rolling_columns() -> Vec<FeatureColumn> {
        use FeatureColumn::*;
        vec![
            Pm25Lag1h, Pm25Lag3h, Pm25Lag6h, Pm25Lag12h, Pm25Lag24h, TempLag1h, HumidityLag1h,
            Pm25RollingMean3h, Pm25RollingMean6h, Pm25RollingMean12h, Pm25RollingStd6h,
            Pm25RollingMax6h, Pm25RollingMin6h, TempRollingMean6h, HumidityRollingMean6h,
            Pm25Change1h, Pm25Change3h,
        ]
    }

    proptest! {
        #[test]
        fn prop_partition_isolation(
            a in prop::collection::vec(prop::option::of(0.0f64..500.0), 1..40),
            b in prop::collection::vec(prop::option::of(0.0f64..500.0), 1..40),
        ) {
            let engineer = FeatureEngineer::new();
            let a_rows = hourly("A", &a);
            // B shifted by 30 minutes so the two locations interleave in time
            let b_rows: Vec<Measurement> = hourly("B", &b)
                .into_iter()
                .map(|mut m| { m.timestamp += Duration::minutes(30); m })
                .collect();

            let mut mixed: Vec<Measurement> = a_rows.iter().cloned().interleave(b_rows.iter().cloned()).collect();
            mixed.sort_by_key(|m| m.timestamp);

            let combined = engineer.create_features(&mixed).for_location("A");
            let alone = engineer.create_features(&a_rows);

            prop_assert_eq!(combined.len(), alone.len());
            for column in lag_and_rolling_columns() {
                prop_assert_eq!(combined.column(column), alone.column(column));
            }
        }

        #[test]
        fn prop_lag_matches_previous_row(
            values in prop::collection::vec(prop::option::of(-50.0f64..500.0), 1..60),
        ) {
            let table = FeatureEngineer::new().create_features(&hourly("A", &values));
            let rows = table.rows();
            prop_assert_eq!(rows[0].get(FeatureColumn::Pm25Lag1h), None);
            for k in 1..rows.len() {
                prop_assert_eq!(rows[k].get(FeatureColumn::Pm25Lag1h), rows[k - 1].get(FeatureColumn::Pm25));
            }
        }

        #[test]
        fn prop_prepare_column_contract(
            values in prop::collection::vec(
                prop::option::of(prop_oneof![
                    -1e6f64..1e6,
                    Just(f64::INFINITY),
                    Just(f64::NEG_INFINITY),
                    Just(f64::NAN),
                ]),
                0..20,
            ),
            picks in prop::collection::vec(0usize..FEATURE_COLUMNS.len(), 1..10),
        ) {
            let rows: Vec<FeatureRow> = values
                .iter()
                .enumerate()
                .map(|(i, &v)| {
                    let mut r = FeatureRow::new("A", base_time() + Duration::hours(i as i64));
                    r.set(FeatureColumn::Pm25Lag1h, v);
                    r.set(FeatureColumn::Temperature, v.map(|x| x * 0.5));
                    r
                })
                .collect();
            let table = FeatureTable::from_rows(rows);
            let columns: Vec<FeatureColumn> = picks.iter().map(|&i| FEATURE_COLUMNS[i]).collect();

            let matrix = FeatureEngineer::new().prepare_for_prediction(&table, &columns);

            prop_assert_eq!(matrix.columns(), columns.as_slice());
            prop_assert_eq!(matrix.nrows(), table.len());
            for row in matrix.rows() {
                prop_assert_eq!(row.len(), columns.len());
                prop_assert!(row.iter().all(|v| v.is_finite()));
            }
        }
    }
}
