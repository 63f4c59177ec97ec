//! Refresh coordinator
//!
//! A refresh moves through
//! `Checking -> Throttled | Executing -> Persisting -> Recording -> Done`,
//! landing in `Failed` when any of the last three steps errors. Requests for the
//! same export are serialized by a per-export lock; a waiter re-checks the cooldown
//! once it gets the lock, so back-to-back requests see `TooSoon` instead of running
//! the query twice. Different exports never wait on each other.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime, Timelike};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::backends::Backends;
use crate::error::{AppError, AppResult};
use crate::exports::metadata::MetadataStore;
use crate::exports::model::BackendKind;
use crate::exports::query_store::QueryStore;
use crate::exports::sink::CsvSink;

/// Minimum time between two refreshes of the same export
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(3 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Checking,
    Throttled,
    Executing,
    Persisting,
    Recording,
    Done,
    Failed,
}

/// Summary of a successful refresh
#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub export: String,
    pub backend: BackendKind,
    pub rows: usize,
    pub columns: usize,
    #[serde(with = "report_time")]
    pub updated_at: NaiveDateTime,
}

mod report_time {
    use chrono::NaiveDateTime;
    use serde::Serializer;

    use crate::exports::model::UPDATED_AT_FORMAT;

    pub fn serialize<S: Serializer>(at: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&at.format(UPDATED_AT_FORMAT).to_string())
    }
}

pub struct RefreshCoordinator {
    metadata: Arc<MetadataStore>,
    queries: QueryStore,
    sink: CsvSink,
    backends: Backends,
    cooldown: Duration,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl RefreshCoordinator {
    pub fn new(
        metadata: Arc<MetadataStore>,
        queries: QueryStore,
        sink: CsvSink,
        backends: Backends,
    ) -> Self {
        Self {
            metadata,
            queries,
            sink,
            backends,
            cooldown: DEFAULT_COOLDOWN,
            locks: DashMap::new(),
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    /// Re-run `export`'s query on `backend`, replace its data file and stamp
    /// its metadata.
    pub async fn refresh(&self, backend: BackendKind, export: &str) -> AppResult<RefreshReport> {
        let lock = self
            .locks
            .entry(export.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            let _guard = lock.lock().await;
            self.refresh_locked(backend, export).await
        };

        drop(lock);
        self.locks
            .remove_if(export, |_, l| Arc::strong_count(l) == 1);

        result
    }

    async fn refresh_locked(&self, backend: BackendKind, export: &str) -> AppResult<RefreshReport> {
        transition(export, RefreshState::Checking);
        let started = now();

        let descriptor = self
            .metadata
            .find_by_name(export)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Export '{}'", export)))?;

        if let Some(last) = descriptor.last_updated_at {
            let elapsed = (started - last).num_seconds();
            let cooldown = self.cooldown.as_secs() as i64;
            if elapsed < cooldown {
                transition(export, RefreshState::Throttled);
                return Err(AppError::TooSoon {
                    name: export.to_string(),
                    cooldown_secs: cooldown,
                    retry_after_secs: cooldown - elapsed.max(0),
                });
            }
        }

        transition(export, RefreshState::Executing);
        let plan = self.queries.lookup(backend, export).await.inspect_err(|e| fail(export, e))?;
        let result = self
            .backends
            .run(backend, &plan)
            .await
            .inspect_err(|e| fail(export, e))?;

        transition(export, RefreshState::Persisting);
        self.sink
            .save(&result, export)
            .await
            .inspect_err(|e| fail(export, e))?;

        transition(export, RefreshState::Recording);
        let updated_at = now();
        self.metadata
            .record_refresh(export, updated_at)
            .await
            .map_err(|e| match e {
                AppError::Persist { .. } => e,
                other => AppError::Persist {
                    name: export.to_string(),
                    reason: other.to_string(),
                },
            })
            .inspect_err(|e| fail(export, e))?;

        transition(export, RefreshState::Done);
        info!(
            export,
            backend = %backend,
            rows = result.row_count(),
            "File updated successfully"
        );

        Ok(RefreshReport {
            export: export.to_string(),
            backend,
            rows: result.row_count(),
            columns: result.columns.len(),
            updated_at,
        })
    }
}

/// Local wall-clock time at second precision, matching the record format
fn now() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

fn transition(export: &str, state: RefreshState) {
    debug!(export, state = ?state, "Refresh state");
}

fn fail(export: &str, error: &AppError) {
    warn!(export, state = ?RefreshState::Failed, error = %error, "Refresh failed");
}
