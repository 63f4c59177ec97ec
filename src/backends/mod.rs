//! Backend executors: one bounded connection pool per database kind
//!
//! Executors are built once by the composition root and shared by every request.
//! The pool is created lazily on first use (or eagerly via [BackendExecutor::initialize])
//! and released explicitly with [BackendExecutor::close].

#[macro_use]
mod pooled;

pub mod mysql;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AppError, AppResult};
use crate::exports::{BackendKind, QueryPlan, QueryResult};

pub use mysql::MySqlExecutor;
pub use pooled::PoolSizing;
pub use postgres::PgExecutor;

/// Connection settings for one database
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub min_size: u32,
    pub max_size: u32,
    pub acquire_timeout: std::time::Duration,
}

#[async_trait]
pub trait BackendExecutor: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Create the pool if it does not exist yet. Safe to call concurrently;
    /// exactly one pool is ever created.
    async fn initialize(&self) -> AppResult<()>;

    /// Run one statement and return every row
    async fn execute(&self, query: &str) -> AppResult<QueryResult>;

    /// Run `prepare` then `read_back` in one transaction. A failing preparation
    /// rolls back and the read-back never runs.
    async fn execute_prepared(&self, prepare: &str, read_back: &str) -> AppResult<QueryResult>;

    /// Release the pool. Idempotent, fine to call when never initialized.
    async fn close(&self) -> AppResult<()>;
}

/// Executors for every backend kind, selected by [BackendKind]
#[derive(Clone)]
pub struct Backends {
    primary: Arc<dyn BackendExecutor>,
    secondary: Arc<dyn BackendExecutor>,
}

impl Backends {
    pub fn new(primary: Arc<dyn BackendExecutor>, secondary: Arc<dyn BackendExecutor>) -> Self {
        Self { primary, secondary }
    }

    pub fn get(&self, kind: BackendKind) -> &Arc<dyn BackendExecutor> {
        match kind {
            BackendKind::Primary => &self.primary,
            BackendKind::Secondary => &self.secondary,
        }
    }

    /// Dispatch a resolved plan to the matching executor
    pub async fn run(&self, kind: BackendKind, plan: &QueryPlan) -> AppResult<QueryResult> {
        let executor = self.get(kind);
        match plan {
            QueryPlan::Single(query) => executor.execute(query).await,
            QueryPlan::PrepareThenRead { prepare, read_back } => {
                executor.execute_prepared(prepare, read_back).await
            }
        }
    }

    /// Close every pool, reporting the first failure after attempting all of them
    pub async fn close_all(&self) -> AppResult<()> {
        let mut first_err: Option<AppError> = None;
        for executor in [&self.primary, &self.secondary] {
            if let Err(e) = executor.close().await {
                tracing::error!(backend = %executor.kind(), error = %e, "Failed to close pool");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

pub(crate) fn query_error(backend: BackendKind, source: sqlx::Error) -> AppError {
    AppError::Query { backend, source }
}
