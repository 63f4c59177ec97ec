//! Query store: resolves the SQL for an export on a given backend
//!
//! Layout under the query root:
//! - `postgres/<export>.sql` runs as a single statement
//! - `mysql/refresh_<export>.sql` materializes the export, which is then read back
//!   from `` `<schema>`.`<export>` ``

use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};
use crate::exports::model::BackendKind;
use crate::exports::storage::is_valid_export_name;

/// What a backend has to run to produce an export's rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryPlan {
    Single(String),
    PrepareThenRead { prepare: String, read_back: String },
}

#[derive(Debug, Clone)]
pub struct QueryStore {
    root: PathBuf,
    readback_schema: String,
}

impl QueryStore {
    pub fn new(root: impl Into<PathBuf>, readback_schema: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            readback_schema: readback_schema.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the query file for (backend, export)
    pub fn path_for(&self, backend: BackendKind, export: &str) -> PathBuf {
        match backend {
            BackendKind::Primary => self.root.join("postgres").join(format!("{}.sql", export)),
            BackendKind::Secondary => self
                .root
                .join("mysql")
                .join(format!("refresh_{}.sql", export)),
        }
    }

    pub async fn lookup(&self, backend: BackendKind, export: &str) -> AppResult<QueryPlan> {
        if !is_valid_export_name(export) {
            return Err(AppError::not_found(format!("Query for '{}'", export)));
        }

        let path = self.path_for(backend, export);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::not_found(format!(
                    "Query for '{}' on {} ({})",
                    export,
                    backend,
                    path.display()
                )));
            }
            Err(e) => {
                return Err(AppError::Internal(format!(
                    "Failed to read query {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        if text.trim().is_empty() {
            return Err(AppError::not_found(format!(
                "Query for '{}' on {} (empty file)",
                export, backend
            )));
        }

        tracing::debug!(export, backend = %backend, path = %path.display(), "Resolved query");

        Ok(match backend {
            BackendKind::Primary => QueryPlan::Single(text),
            BackendKind::Secondary => QueryPlan::PrepareThenRead {
                prepare: text,
                read_back: format!("SELECT * FROM `{}`.`{}`", self.readback_schema, export),
            },
        })
    }
}
