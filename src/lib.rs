//! Export Hub
//!
//! Serves a role-gated catalog of database exports. Each export is a CSV
//! snapshot of one query against the primary (PostgreSQL) or secondary (MySQL)
//! backend and can be refreshed on demand, at most once per cooldown window.

pub mod api;
pub mod app;
pub mod backends;
pub mod config;
pub mod db;
pub mod error;
pub mod exports;
pub mod services;

pub use app::{AppState, build_app};
pub use error::{AppError, AppResult};
