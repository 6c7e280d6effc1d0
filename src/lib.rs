//! PM2.5 forecasting service
//!
//! Feature engineering, per-location model training and recursive hourly
//! prediction over air quality measurements, with a thin HTTP surface.

pub mod api;
pub mod app;
pub mod config;
pub mod domain;
pub mod ml;
pub mod repo;
pub mod telemetry;
