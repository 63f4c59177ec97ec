//! Pool lifecycle and query flow shared by the sqlx executors
//!
//! [LazyPool] owns the one pool of a backend. [impl_backend_executor!] expands the
//! query flow for a concrete sqlx driver; each backend module only supplies its
//! `decode_cell`.

use std::time::Duration;

use sqlx::pool::PoolOptions;
use sqlx::{Connection, Database, Pool, Transaction};
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::PoolSettings;
use crate::error::{AppError, AppResult};
use crate::exports::BackendKind;

/// Pool bounds
#[derive(Debug, Clone, Copy)]
pub struct PoolSizing {
    pub min_size: u32,
    pub max_size: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolSizing {
    fn default() -> Self {
        Self {
            min_size: 0,
            max_size: 5,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&PoolSettings> for PoolSizing {
    fn from(settings: &PoolSettings) -> Self {
        Self {
            min_size: settings.min_size,
            max_size: settings.max_size,
            acquire_timeout: settings.acquire_timeout,
        }
    }
}

type ConnectOptionsOf<DB> = <<DB as Database>::Connection as Connection>::Options;

/// A pool created on first use and released by [LazyPool::close]
#[derive(Debug)]
pub(crate) struct LazyPool<DB: Database> {
    kind: BackendKind,
    label: &'static str,
    options: ConnectOptionsOf<DB>,
    sizing: PoolSizing,
    pool: Mutex<Option<Pool<DB>>>,
}

impl<DB: Database> LazyPool<DB> {
    pub(crate) fn new(
        kind: BackendKind,
        label: &'static str,
        options: ConnectOptionsOf<DB>,
        sizing: PoolSizing,
    ) -> Self {
        Self {
            kind,
            label,
            options,
            sizing,
            pool: Mutex::new(None),
        }
    }

    pub(crate) fn kind(&self) -> BackendKind {
        self.kind
    }

    /// Shared pool. Concurrent first callers wait on the slot, so exactly one pool
    /// is created; a failed attempt leaves the slot empty for the next caller.
    pub(crate) async fn get(&self) -> AppResult<Pool<DB>> {
        let mut slot = self.pool.lock().await;
        if let Some(pool) = slot.as_ref() {
            return Ok(pool.clone());
        }

        let pool = PoolOptions::<DB>::new()
            .min_connections(self.sizing.min_size)
            .max_connections(self.sizing.max_size)
            .acquire_timeout(self.sizing.acquire_timeout)
            .connect_with(self.options.clone())
            .await
            .map_err(|source| {
                warn!(backend = %self.kind, error = %source, "Error connecting to {}", self.label);
                AppError::Connection {
                    backend: self.kind,
                    source,
                }
            })?;

        info!(
            backend = %self.kind,
            min = self.sizing.min_size,
            max = self.sizing.max_size,
            "Connected to {} using connection pool",
            self.label
        );
        *slot = Some(pool.clone());
        Ok(pool)
    }

    pub(crate) async fn is_initialized(&self) -> bool {
        self.pool.lock().await.is_some()
    }

    /// Idempotent; a never-created pool is a no-op
    pub(crate) async fn close(&self) {
        let pool = self.pool.lock().await.take();
        if let Some(pool) = pool {
            pool.close().await;
            info!(backend = %self.kind, "{} connection pool has been closed", self.label);
        }
    }

    pub(crate) fn connection_error(&self, source: sqlx::Error) -> AppError {
        AppError::Connection {
            backend: self.kind,
            source,
        }
    }
}

/// Roll back, logging instead of masking the error that caused it
pub(crate) async fn rollback<DB: Database>(kind: BackendKind, tx: Transaction<'_, DB>) {
    if let Err(e) = tx.rollback().await {
        warn!(backend = %kind, error = %e, "Rollback failed");
    }
}

/// Lossless text for a value no typed decoder claimed: UTF-8 as is, anything else
/// as `\x`-prefixed hex.
pub(crate) fn raw_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => hex(bytes),
    }
}

pub(crate) fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

/// Implements [super::BackendExecutor] for a struct with a `pool: LazyPool<$db>`
/// field. The invoking module provides
/// `fn decode_cell(&$row, usize) -> Result<CellValue, sqlx::Error>`.
macro_rules! impl_backend_executor {
    ($executor:ty, $db:ty, $row:ty) => {
        #[async_trait::async_trait]
        impl $crate::backends::BackendExecutor for $executor {
            fn kind(&self) -> $crate::exports::BackendKind {
                self.pool.kind()
            }

            async fn initialize(&self) -> $crate::error::AppResult<()> {
                self.pool.get().await.map(|_| ())
            }

            async fn execute(&self, query: &str) -> $crate::error::AppResult<$crate::exports::QueryResult> {
                let kind = self.pool.kind();
                let pool = self.pool.get().await?;
                let mut conn = pool
                    .acquire()
                    .await
                    .map_err(|e| self.pool.connection_error(e))?;

                tracing::debug!(backend = %kind, "Executing query");
                let (columns, rows) = fetch_with_columns(&mut *conn, query)
                    .await
                    .map_err(|e| $crate::backends::query_error(kind, e))?;

                decode_rows(kind, columns, &rows)
            }

            async fn execute_prepared(
                &self,
                prepare: &str,
                read_back: &str,
            ) -> $crate::error::AppResult<$crate::exports::QueryResult> {
                let kind = self.pool.kind();
                let pool = self.pool.get().await?;
                let mut tx = pool.begin().await.map_err(|e| self.pool.connection_error(e))?;

                tracing::debug!(backend = %kind, "Running preparation statement");
                if let Err(e) = sqlx::Executor::execute(&mut *tx, sqlx::raw_sql(prepare)).await {
                    tracing::warn!(backend = %kind, error = %e, "Preparation failed, rolling back");
                    $crate::backends::pooled::rollback(kind, tx).await;
                    return Err($crate::backends::query_error(kind, e));
                }

                let (columns, rows) = match fetch_with_columns(&mut *tx, read_back).await {
                    Ok(read) => read,
                    Err(e) => {
                        tracing::warn!(backend = %kind, error = %e, "Read-back failed, rolling back");
                        $crate::backends::pooled::rollback(kind, tx).await;
                        return Err($crate::backends::query_error(kind, e));
                    }
                };

                match decode_rows(kind, columns, &rows) {
                    Ok(result) => {
                        tx.commit()
                            .await
                            .map_err(|e| $crate::backends::query_error(kind, e))?;
                        Ok(result)
                    }
                    Err(e) => {
                        tracing::warn!(backend = %kind, error = %e, "Decoding read-back failed, rolling back");
                        $crate::backends::pooled::rollback(kind, tx).await;
                        Err(e)
                    }
                }
            }

            async fn close(&self) -> $crate::error::AppResult<()> {
                self.pool.close().await;
                Ok(())
            }
        }

        /// All rows of `sql`; column names come from `describe` when there are none
        async fn fetch_with_columns(
            conn: &mut <$db as sqlx::Database>::Connection,
            sql: &str,
        ) -> Result<(Vec<String>, Vec<$row>), sqlx::Error> {
            let rows = sqlx::query(sql).fetch_all(&mut *conn).await?;
            let columns = match rows.first() {
                Some(first) => sqlx::Row::columns(first)
                    .iter()
                    .map(|c| sqlx::Column::name(c).to_string())
                    .collect(),
                None => sqlx::Executor::describe(&mut *conn, sql)
                    .await?
                    .columns()
                    .iter()
                    .map(|c| sqlx::Column::name(c).to_string())
                    .collect(),
            };
            Ok((columns, rows))
        }

        fn decode_rows(
            kind: $crate::exports::BackendKind,
            columns: Vec<String>,
            rows: &[$row],
        ) -> $crate::error::AppResult<$crate::exports::QueryResult> {
            let rows = rows
                .iter()
                .map(|row| (0..sqlx::Row::len(row)).map(|idx| decode_cell(row, idx)).collect())
                .collect::<Result<Vec<Vec<$crate::exports::CellValue>>, sqlx::Error>>()
                .map_err(|e| $crate::backends::query_error(kind, e))?;
            Ok($crate::exports::QueryResult::new(columns, rows))
        }
    };
}
