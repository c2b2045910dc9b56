//! HTTP entry point.
//!
//! # Routes
//!
//! - `POST /` - Run a batch
//! - `POST /download` - Run a batch (alias)
//! - `GET /health` - Health check

mod error;
mod payload;

pub use error::ApiError;
pub use payload::{BatchResponse, parse_payload, process_payload};

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::info;

use crate::pipeline::BatchScheduler;

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub scheduler: Arc<BatchScheduler>,
}

impl AppState {
    /// Creates state around a scheduler.
    #[must_use]
    pub fn new(scheduler: Arc<BatchScheduler>) -> Self {
        Self { scheduler }
    }
}

/// Builds the router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", post(run_batch))
        .route("/download", post(run_batch))
        .route("/health", get(health_check))
        .with_state(state)
}

/// Binds `address` and serves until the listener fails.
///
/// # Errors
///
/// Returns an IO error if binding or serving fails.
pub async fn serve(address: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = TcpListener::bind(address).await?;
    info!(address = %listener.local_addr()?, "listening");
    axum::serve(listener, create_router(state)).await
}

async fn run_batch(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<BatchResponse>, ApiError> {
    process_payload(&state.scheduler, &body, None).await.map(Json)
}

async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
