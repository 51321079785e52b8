use crate::error::{Result, ScraperError};
use crate::metrics;
use crate::tasks::IngestionScheduler;
use axum::{
    extract::Path,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Extension, Router,
};
use hyper::Server;
use std::net::SocketAddr;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "gnv-scraper",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Prometheus text exposition
async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render(),
    )
}

/// Kick off a background crawl of one source.
async fn trigger_ingest(
    Extension(scheduler): Extension<IngestionScheduler>,
    Path(source): Path<String>,
) -> impl IntoResponse {
    if scheduler.start_ingestion(&source) {
        (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "status": "started", "source": source })),
        )
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("unknown source '{source}'") })),
        )
    }
}

/// Create the HTTP router
pub fn create_server(scheduler: IngestionScheduler) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .route("/admin/ingest/:source", post(trigger_ingest))
        .layer(Extension(scheduler))
        .layer(ServiceBuilder::new().layer(cors))
}

/// Serve on `port`. Scheduled ingestion starts once the listener is bound; Ctrl+C
/// stops the server and cancels running crawls.
pub async fn start_server(
    scheduler: IngestionScheduler,
    port: u16,
    schedule: Option<Duration>,
) -> Result<()> {
    let app = create_server(scheduler.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let server = Server::try_bind(&addr)
        .map_err(|e| ScraperError::api(format!("cannot bind {addr}: {e}")))?
        .serve(app.into_make_service());

    info!("🚀 HTTP server running on http://localhost:{}", port);
    info!("💚 Health check: http://localhost:{}/health", port);

    if let Some(interval) = schedule {
        let background = scheduler.clone();
        tokio::spawn(async move { background.run_periodic(interval).await });
    }

    server
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
            scheduler.shutdown();
        })
        .await
        .map_err(|e| ScraperError::api(format!("server error: {e}")))
}
