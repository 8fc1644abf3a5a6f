//! HTTP scrape endpoint.
//!
//! - `GET /metrics`: Prometheus text exposition
//! - `GET /health`: liveness check, always `OK`
//! - everything else: files from the optional static directory (dashboard)

use crate::metrics::prometheus::PrometheusMetrics;
use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::error;

/// Build the router. `static_dir` is served at `/` and `/static/`.
pub fn router(metrics: Arc<PrometheusMetrics>, static_dir: Option<&Path>) -> Router {
    let mut router = Router::new()
        .route("/metrics", get(scrape))
        .route("/health", get(health))
        .with_state(metrics);

    if let Some(dir) = static_dir {
        router = router
            .nest_service("/static", ServeDir::new(dir))
            .fallback_service(ServeDir::new(dir));
    }

    router.layer(TraceLayer::new_for_http())
}

async fn scrape(State(metrics): State<Arc<PrometheusMetrics>>) -> Response {
    match metrics.encode() {
        Ok(body) => {
            ([(header::CONTENT_TYPE, ::prometheus::TEXT_FORMAT)], body).into_response()
        }
        Err(e) => {
            error!("failed to encode metrics: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn health() -> &'static str {
    "OK"
}

/// Serve `router` on `listener` until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    cancel: CancellationToken,
) -> io::Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
}
