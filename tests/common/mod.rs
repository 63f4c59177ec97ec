//! Shared fixtures for integration tests: a scriptable in-memory executor and a
//! scratch directory holding queries, data files and the metadata record.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime, Timelike};
use tokio::sync::{Barrier, Mutex};

use export_hub::backends::{BackendExecutor, Backends};
use export_hub::error::{AppError, AppResult};
use export_hub::exports::{
    BackendKind, CellValue, CsvSink, MetadataStore, QueryResult, QueryStore, RefreshCoordinator,
    UPDATED_AT_FORMAT,
};

/// How a [FakeExecutor] answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Rows,
    QueryFails,
    ConnectionFails,
}

type Hook = Box<dyn Fn() + Send + Sync>;

pub struct FakeExecutor {
    kind: BackendKind,
    result: QueryResult,
    outcome: Outcome,
    delay: Duration,
    barrier: Option<Arc<Barrier>>,
    on_execute: Option<Hook>,
    calls: AtomicUsize,
    queries: Mutex<Vec<String>>,
    prepared: Mutex<Vec<(String, String)>>,
}

impl FakeExecutor {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            result: sample_result(),
            outcome: Outcome::Rows,
            delay: Duration::ZERO,
            barrier: None,
            on_execute: None,
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
            prepared: Mutex::new(Vec::new()),
        }
    }

    pub fn with_result(mut self, result: QueryResult) -> Self {
        self.result = result;
        self
    }

    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Every execution waits on `barrier` before answering
    pub fn with_barrier(mut self, barrier: Arc<Barrier>) -> Self {
        self.barrier = Some(barrier);
        self
    }

    /// Runs while the query is "in flight"
    pub fn on_execute(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_execute = Some(Box::new(hook));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn queries(&self) -> Vec<String> {
        self.queries.lock().await.clone()
    }

    pub async fn prepared(&self) -> Vec<(String, String)> {
        self.prepared.lock().await.clone()
    }

    async fn answer(&self) -> AppResult<QueryResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = &self.on_execute {
            hook();
        }
        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match self.outcome {
            Outcome::Rows => Ok(self.result.clone()),
            Outcome::QueryFails => Err(AppError::Query {
                backend: self.kind,
                source: sqlx::Error::Protocol("relation \"sales\" does not exist".into()),
            }),
            Outcome::ConnectionFails => Err(AppError::Connection {
                backend: self.kind,
                source: sqlx::Error::PoolTimedOut,
            }),
        }
    }
}

#[async_trait]
impl BackendExecutor for FakeExecutor {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn initialize(&self) -> AppResult<()> {
        Ok(())
    }

    async fn execute(&self, query: &str) -> AppResult<QueryResult> {
        self.queries.lock().await.push(query.to_string());
        self.answer().await
    }

    async fn execute_prepared(&self, prepare: &str, read_back: &str) -> AppResult<QueryResult> {
        self.prepared
            .lock()
            .await
            .push((prepare.to_string(), read_back.to_string()));
        self.answer().await
    }

    async fn close(&self) -> AppResult<()> {
        Ok(())
    }
}

pub fn sample_result() -> QueryResult {
    QueryResult::new(
        vec!["region".into(), "total".into(), "note".into()],
        vec![
            vec!["north".into(), CellValue::Int(10), CellValue::Null],
            vec!["south, east".into(), CellValue::Float(2.5), "ok".into()],
        ],
    )
}

pub const SAMPLE_CSV: &str = "region,total,note\nnorth,10,\n\"south, east\",2.5,ok\n";

/// Current local time, second precision, as stored in the metadata record
pub fn now() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

pub fn stamp(at: NaiveDateTime) -> String {
    at.format(UPDATED_AT_FORMAT).to_string()
}

pub fn minutes_ago(minutes: i64) -> String {
    stamp(now() - chrono::Duration::minutes(minutes))
}

/// Catalog entry as it appears in the metadata record
pub fn entry(name: &str, role: &str, updated_at: Option<&str>) -> serde_json::Value {
    serde_json::json!({ "fileName": name, "role": role, "updatedAt": updated_at })
}

/// Scratch workspace: `queries/`, `data/` and `data/file_metadata.json`
pub struct Workspace {
    pub dir: tempfile::TempDir,
    pub metadata: Arc<MetadataStore>,
    pub sink: CsvSink,
    pub queries: QueryStore,
}

impl Workspace {
    pub fn new(catalog: Vec<serde_json::Value>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        std::fs::create_dir_all(&data).unwrap();
        std::fs::create_dir_all(dir.path().join("queries/postgres")).unwrap();
        std::fs::create_dir_all(dir.path().join("queries/mysql")).unwrap();

        let metadata_path = data.join("file_metadata.json");
        std::fs::write(
            &metadata_path,
            serde_json::to_vec_pretty(&serde_json::Value::Array(catalog)).unwrap(),
        )
        .unwrap();

        Self {
            metadata: Arc::new(MetadataStore::new(&metadata_path)),
            sink: CsvSink::new(&data),
            queries: QueryStore::new(dir.path().join("queries"), "mv"),
            dir,
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.dir.path().join("data")
    }

    pub fn metadata_path(&self) -> &Path {
        self.metadata.path()
    }

    pub fn metadata_bytes(&self) -> Vec<u8> {
        std::fs::read(self.metadata_path()).unwrap()
    }

    pub fn data_file(&self, export: &str) -> PathBuf {
        self.sink.path_for(export)
    }

    pub fn write_pg_query(&self, export: &str, sql: &str) {
        std::fs::write(
            self.dir.path().join("queries/postgres").join(format!("{}.sql", export)),
            sql,
        )
        .unwrap();
    }

    pub fn write_my_query(&self, export: &str, sql: &str) {
        std::fs::write(
            self.dir
                .path()
                .join("queries/mysql")
                .join(format!("refresh_{}.sql", export)),
            sql,
        )
        .unwrap();
    }

    pub fn coordinator(
        &self,
        primary: Arc<FakeExecutor>,
        secondary: Arc<FakeExecutor>,
    ) -> RefreshCoordinator {
        RefreshCoordinator::new(
            self.metadata.clone(),
            self.queries.clone(),
            self.sink.clone(),
            Backends::new(primary, secondary),
        )
    }
}
