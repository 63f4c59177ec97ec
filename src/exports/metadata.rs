//! Export metadata store
//!
//! The catalog is one JSON array of `{fileName, role, updatedAt}` objects. It is
//! always read whole and written back whole; writers are serialized so a
//! read-modify-write never loses another writer's update.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tokio::sync::Mutex;

use crate::error::{AppError, AppResult};
use crate::exports::access::visibility;
use crate::exports::model::{ExportDescriptor, Role};
use crate::exports::storage::write_atomically;

pub struct MetadataStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl MetadataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every descriptor, in record order. One malformed entry, such as an
    /// unrecognized role, makes the whole record [AppError::Corrupt].
    pub async fn load(&self) -> AppResult<Vec<ExportDescriptor>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::not_found(format!(
                    "Metadata record {}",
                    self.path.display()
                )));
            }
            Err(e) => {
                return Err(AppError::Internal(format!(
                    "Failed to read metadata record {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };

        let descriptors: Vec<ExportDescriptor> = serde_json::from_slice(&raw)?;
        Ok(descriptors)
    }

    /// Exact, case-sensitive lookup
    pub async fn find_by_name(&self, name: &str) -> AppResult<Option<ExportDescriptor>> {
        let descriptors = self.load().await?;
        Ok(descriptors.into_iter().find(|d| d.name == name))
    }

    /// Set `name`'s `updatedAt` and persist the whole collection
    pub async fn record_refresh(&self, name: &str, at: NaiveDateTime) -> AppResult<()> {
        let _guard = self.write_lock.lock().await;

        let mut descriptors = self.load().await?;
        let descriptor = descriptors
            .iter_mut()
            .find(|d| d.name == name)
            .ok_or_else(|| AppError::not_found(format!("Export '{}'", name)))?;
        descriptor.last_updated_at = Some(at);

        self.persist(name, &descriptors).await?;
        tracing::debug!(export = name, updated_at = %at, "Recorded refresh");
        Ok(())
    }

    /// Descriptors visible to `role`. Unknown roles are rejected.
    pub async fn filter_by_role(&self, role: &str) -> AppResult<Vec<ExportDescriptor>> {
        let role: Role = role.parse()?;
        let policy = visibility(role);

        let descriptors = self.load().await?;
        Ok(descriptors.into_iter().filter(|d| policy.allows(d)).collect())
    }

    async fn persist(&self, name: &str, descriptors: &[ExportDescriptor]) -> AppResult<()> {
        let bytes = serde_json::to_vec_pretty(descriptors)?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_atomically(&path, &bytes))
            .await
            .map_err(|e| AppError::Internal(format!("Metadata task failed: {}", e)))?
            .map_err(|e| AppError::Persist {
                name: name.to_string(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use crate::exports::model::UPDATED_AT_FORMAT;

    const CATALOG: &str = r#"[
        {"fileName": "sales_q1", "role": "A", "updatedAt": null},
        {"fileName": "sales_q1_archive", "role": "A", "updatedAt": "2024-01-01 00:00:00"},
        {"fileName": "stock", "role": "B", "updatedAt": "2024-02-01 12:30:00"}
    ]"#;

    fn seeded() -> (tempfile::TempDir, MetadataStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file_metadata.json");
        std::fs::write(&path, CATALOG).unwrap();
        (dir, MetadataStore::new(path))
    }

    fn names(descriptors: &[ExportDescriptor]) -> Vec<&str> {
        descriptors.iter().map(|d| d.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_load_missing_record_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(dir.path().join("absent.json"));
        assert_matches!(store.load().await, Err(AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_load_malformed_record_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file_metadata.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = MetadataStore::new(path);
        assert_matches!(store.load().await, Err(AppError::Corrupt(_)));
    }

    #[tokio::test]
    async fn test_unknown_catalog_role_rejects_the_whole_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file_metadata.json");
        std::fs::write(
            &path,
            r#"[{"fileName": "sales_q1", "role": "A"}, {"fileName": "legacy", "role": "C"}]"#,
        )
        .unwrap();
        let store = MetadataStore::new(path);

        assert_matches!(store.find_by_name("sales_q1").await, Err(AppError::Corrupt(_)));
        assert_matches!(store.filter_by_role("admin").await, Err(AppError::Corrupt(_)));
    }

    #[tokio::test]
    async fn test_find_by_name_is_exact() {
        let (_dir, store) = seeded();

        let found = store.find_by_name("sales_q1").await.unwrap().unwrap();
        assert_eq!(found.name, "sales_q1");
        assert!(found.last_updated_at.is_none());

        assert!(store.find_by_name("sales").await.unwrap().is_none());
        assert!(store.find_by_name("SALES_Q1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_record_refresh_updates_only_the_named_export() {
        let (_dir, store) = seeded();
        let at = NaiveDateTime::parse_from_str("2024-05-05 10:00:00", UPDATED_AT_FORMAT).unwrap();

        store.record_refresh("sales_q1", at).await.unwrap();

        let reloaded = store.load().await.unwrap();
        assert_eq!(names(&reloaded), vec!["sales_q1", "sales_q1_archive", "stock"]);
        assert_eq!(reloaded[0].last_updated_at, Some(at));
        assert_eq!(
            reloaded[1].last_updated_at,
            Some(NaiveDateTime::parse_from_str("2024-01-01 00:00:00", UPDATED_AT_FORMAT).unwrap())
        );

        let on_disk = std::fs::read_to_string(store.path()).unwrap();
        assert!(on_disk.contains("\"updatedAt\": \"2024-05-05 10:00:00\""));
    }

    #[tokio::test]
    async fn test_record_refresh_unknown_export() {
        let (_dir, store) = seeded();
        let before = std::fs::read_to_string(store.path()).unwrap();

        let at = chrono::Local::now().naive_local();
        assert_matches!(store.record_refresh("ghost", at).await, Err(AppError::NotFound(_)));
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), before);
    }

    #[tokio::test]
    async fn test_filter_by_role() {
        let (_dir, store) = seeded();

        let all = store.filter_by_role("admin").await.unwrap();
        assert_eq!(names(&all), vec!["sales_q1", "sales_q1_archive", "stock"]);

        let a = store.filter_by_role("A").await.unwrap();
        assert_eq!(names(&a), vec!["sales_q1", "sales_q1_archive"]);

        let b = store.filter_by_role("B").await.unwrap();
        assert_eq!(names(&b), vec!["stock"]);

        assert_matches!(store.filter_by_role("C").await, Err(AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_concurrent_records_do_not_lose_updates() {
        let (_dir, store) = seeded();
        let store = std::sync::Arc::new(store);
        let at = NaiveDateTime::parse_from_str("2024-06-01 08:00:00", UPDATED_AT_FORMAT).unwrap();

        let handles: Vec<_> = ["sales_q1", "sales_q1_archive", "stock"]
            .into_iter()
            .map(|name| {
                let store = store.clone();
                tokio::spawn(async move { store.record_refresh(name, at).await })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let reloaded = store.load().await.unwrap();
        assert!(reloaded.iter().all(|d| d.last_updated_at == Some(at)));
    }
}
