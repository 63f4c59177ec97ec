//! Tabular sink: one CSV file per export, replaced atomically on every save

use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};
use crate::exports::model::QueryResult;
use crate::exports::storage::{is_valid_export_name, write_atomically};

#[derive(Debug, Clone)]
pub struct CsvSink {
    data_dir: PathBuf,
}

impl CsvSink {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Location of an export's data file
    pub fn path_for(&self, export: &str) -> PathBuf {
        self.data_dir.join(format!("{}.csv", export))
    }

    pub async fn save(&self, result: &QueryResult, export: &str) -> AppResult<PathBuf> {
        if !is_valid_export_name(export) {
            return Err(AppError::InvalidRequest(format!(
                "Invalid export name '{}'",
                export
            )));
        }

        let bytes = encode_csv(result).map_err(|source| AppError::Write {
            name: export.to_string(),
            source,
        })?;

        let path = self.path_for(export);
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&target, &bytes))
            .await
            .map_err(|e| AppError::Internal(format!("Sink task failed: {}", e)))?
            .map_err(|source| AppError::Write {
                name: export.to_string(),
                source,
            })?;

        tracing::info!(
            export,
            rows = result.row_count(),
            path = %path.display(),
            "Saved export data file"
        );
        Ok(path)
    }
}

fn encode_csv(result: &QueryResult) -> std::io::Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    if !result.columns.is_empty() {
        writer.write_record(&result.columns)?;
    }
    for row in &result.rows {
        writer.write_record(row.iter().map(|cell| cell.to_field()))?;
    }
    writer
        .into_inner()
        .map_err(|e| std::io::Error::other(e.to_string()))
}
