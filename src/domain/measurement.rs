use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One reading for one location at one timestamp.
///
/// Pollutant and weather fields are optional: the two upstream sources
/// (air quality and weather) do not always report for the same hour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub location: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,

    // Pollutants (µg/m³, CO in mg/m³)
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
    pub no2: Option<f64>,
    pub so2: Option<f64>,
    pub co: Option<f64>,
    pub o3: Option<f64>,

    // Weather
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub wind_speed: Option<f64>,

    /// Traffic congestion level (1-10)
    pub traffic_level: Option<i32>,
}

impl Measurement {
    /// Create an empty reading; every optional field starts out absent
    pub fn new(location: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            location: location.into(),
            timestamp,
            latitude: 0.0,
            longitude: 0.0,
            pm25: None,
            pm10: None,
            no2: None,
            so2: None,
            co: None,
            o3: None,
            temperature: None,
            humidity: None,
            pressure: None,
            wind_speed: None,
            traffic_level: None,
        }
    }

    pub fn with_pm25(mut self, pm25: f64) -> Self {
        self.pm25 = Some(pm25);
        self
    }

    pub fn with_weather(mut self, temperature: f64, humidity: f64, pressure: f64) -> Self {
        self.temperature = Some(temperature);
        self.humidity = Some(humidity);
        self.pressure = Some(pressure);
        self
    }
}

/// Which locations an operation applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LocationSelector {
    /// Every location present in the fetched history
    All,
    Named(String),
}

impl LocationSelector {
    pub const WILDCARD: &'static str = "all";

    /// Parse a user-supplied selector; `"all"` (any case) or an empty string is the wildcard
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(Self::WILDCARD) {
            Self::All
        } else {
            Self::Named(trimmed.to_string())
        }
    }

    pub fn named(location: impl Into<String>) -> Self {
        Self::Named(location.into())
    }

    pub fn matches(&self, location: &str) -> bool {
        match self {
            Self::All => true,
            Self::Named(name) => name == location,
        }
    }

    /// The concrete location name, if this is not the wildcard
    pub fn location(&self) -> Option<&str> {
        match self {
            Self::All => None,
            Self::Named(name) => Some(name.as_str()),
        }
    }
}

impl fmt::Display for LocationSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "{}", Self::WILDCARD),
            Self::Named(name) => write!(f, "{}", name),
        }
    }
}
