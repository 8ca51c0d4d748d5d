//! HTTP trigger for the stats card.
//!
//! `GET /` resolves today's stats; the body is always a flat JSON object
//! with status 200, error mappings included.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use common::Fields;
use stats_cache::CacheOrchestrator;
use tracing::info;

pub fn build_app(orchestrator: Arc<CacheOrchestrator>) -> Router {
    Router::new()
        .route("/", get(stats))
        .route("/healthz", get(healthz))
        .with_state(orchestrator)
}

async fn stats(State(orchestrator): State<Arc<CacheOrchestrator>>) -> Json<Fields> {
    Json(orchestrator.resolve().await.into_mapping())
}

async fn healthz() -> &'static str {
    "ok"
}

pub async fn serve(bind_addr: &str, orchestrator: Arc<CacheOrchestrator>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, build_app(orchestrator))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}
