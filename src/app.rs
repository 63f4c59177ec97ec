//! Application state and HTTP router construction.

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderValue, Method, header};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::config::Config;
use crate::db::Database;
use crate::exports::{CsvSink, MetadataStore, RefreshCoordinator};
use crate::services::auth::AuthService;

/// Shared state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Database,
    pub auth: Arc<AuthService>,
    pub metadata: Arc<MetadataStore>,
    pub sink: CsvSink,
    pub coordinator: Arc<RefreshCoordinator>,
}

/// Build the full Axum router. Business routes are served both at the root and
/// under `/api`.
pub fn build_app(state: AppState) -> Router<()> {
    let origins: Vec<HeaderValue> = state
        .config
        .cors_origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT]);

    Router::new()
        .merge(api::health::router())
        .merge(api::auth::router())
        .merge(api::files::router())
        .nest("/api", api::files::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
