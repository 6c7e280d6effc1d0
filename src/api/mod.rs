pub mod error;
pub mod ml;

use axum::{
    http::StatusCode,
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::app::AppState;

pub fn router(state: AppState) -> Router {
    let request_timeout = Duration::from_secs(state.cfg.server.request_timeout_secs);

    Router::new()
        .route("/health", get(ml::health))
        .route("/predict", post(ml::predict))
        .route("/train", post(ml::train))
        .route("/models", get(ml::list_models))
        .route("/metrics/:model_name", get(ml::model_metrics))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(axum::extract::DefaultBodyLimit::max(1024 * 1024))
                .layer(timeout_layer(request_timeout)),
        )
        .layer(TraceLayer::new_for_http())
}

/// Requests running past `timeout` are answered with 408
fn timeout_layer(timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test(start_paused = true)]
    async fn test_slow_request_times_out() {
        let app = Router::new()
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "done"
                }),
            )
            .layer(timeout_layer(Duration::from_secs(1)));

        let response = app
            .oneshot(Request::get("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }
}
