//! Health check endpoints

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::app::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub database: bool,
    pub metadata: bool,
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "Hello, World!" }))
}

/// Health check - always returns OK if the server is running
async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness check - users table in place and metadata record readable
async fn readyz(State(state): State<AppState>) -> Json<ReadyResponse> {
    let database = state.db.ensure_schema().await.is_ok()
        && sqlx::query("SELECT 1").fetch_one(state.db.pool()).await.is_ok();
    let metadata = state.metadata.load().await.is_ok();

    Json(ReadyResponse {
        ready: database && metadata,
        database,
        metadata,
    })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
}
