//! HTTP API: Axum JSON surface over the decision engine.
//!
//! Every engine entry point is exposed as one route. CORS is open for
//! local tooling.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use routes::AppState;

/// Serve the API on `port` until the future is dropped or the listener fails.
pub async fn serve(state: AppState, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind API port {port}"))?;
    info!(port, "API server listening on http://localhost:{port}");

    axum::serve(listener, app).await.context("API server error")
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/stake", post(routes::optimize_stake))
        .route("/api/stake/batch", post(routes::optimize_batch))
        .route("/api/odds", get(routes::get_odds))
        .route("/api/timing/:match_id/:market", get(routes::get_timing))
        .route("/api/snapshots/:match_id", post(routes::record_snapshot))
        .route("/api/disagreement", post(routes::ensemble_disagreement))
        .route("/api/decide", post(routes::decide))
        .route("/health", get(routes::health))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
