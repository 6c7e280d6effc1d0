use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub ml: MlConfig,
    pub db: DbConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            request_timeout_secs: 120,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

/// Forecasting core settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlConfig {
    /// Directory holding `{key}.bin` artifacts and their metrics sidecars
    pub model_dir: PathBuf,
    /// History window fetched for training
    pub training_window_days: i64,
    /// History window fetched to seed a forecast (must cover the 24h lag)
    pub prediction_window_hours: i64,
    /// Clean rows a location needs before it is trained
    pub min_training_rows: usize,
    pub default_hours_ahead: u32,
    pub fetch_timeout_secs: u64,
    pub train_on_startup: bool,
    /// History window used by the startup bootstrap
    pub bootstrap_window_days: i64,
}

impl Default for MlConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            training_window_days: 90,
            prediction_window_hours: 48,
            min_training_rows: 100,
            default_hours_ahead: 24,
            fetch_timeout_secs: 10,
            train_on_startup: true,
            bootstrap_window_days: 7,
        }
    }
}

impl MlConfig {
    pub fn training_window(&self) -> chrono::Duration {
        chrono::Duration::days(self.training_window_days)
    }

    pub fn prediction_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.prediction_window_hours)
    }

    pub fn bootstrap_window(&self) -> chrono::Duration {
        chrono::Duration::days(self.bootstrap_window_days)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DbConfig {
    /// Postgres URL; empty means the in-memory repository
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// `json` or `pretty`
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: "json".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from("config/default.toml")
    }

    pub fn load_from(path: &str) -> Result<Self> {
        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("AIRQ__").split("__"));
        Ok(figment.extract()?)
    }
}
