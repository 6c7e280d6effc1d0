use airq_forecast::{api, app::AppState, config::Config, telemetry};
use anyhow::Result;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cfg = Config::load()?;
    telemetry::init_tracing(&cfg.log);

    let app_state = AppState::new(cfg.clone()).await?;
    app_state.bootstrap().await;

    let app = api::router(app_state);
    let addr = cfg.server.socket_addr()?;

    if cfg.server.host == "0.0.0.0" {
        warn!("Server binding to 0.0.0.0 - service will be accessible from the network");
    }
    info!(%addr, "starting air quality forecasting service");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await?;

    warn!("shutdown complete");
    Ok(())
}
