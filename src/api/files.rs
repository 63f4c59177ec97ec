//! Export catalog, download and refresh endpoints

use axum::{
    Json, Router,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::Deserialize;
use serde_json::{Value, json};

use super::extract::ApiJson;
use crate::app::AppState;
use crate::error::{AppError, AppResult};
use crate::exports::storage::is_valid_export_name;
use crate::exports::{BackendKind, ExportDescriptor, can_access};
use crate::services::auth::AuthUser;

#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub db: BackendKind,
    pub filename: String,
}

/// Exports visible to the caller's role
async fn list_files(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<Vec<ExportDescriptor>>> {
    let files = state.metadata.filter_by_role(user.role.as_str()).await?;
    Ok(Json(files))
}

async fn download_file(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(body): ApiJson<DownloadRequest>,
) -> AppResult<Response> {
    let filename = body
        .filename
        .filter(|f| !f.trim().is_empty())
        .ok_or_else(|| AppError::InvalidRequest("Filename is required".to_string()))?;

    if !is_valid_export_name(&filename) {
        return Err(AppError::not_found("File"));
    }
    authorize(&state, &user, &filename).await?;

    let path = state.sink.path_for(&filename);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::not_found("File"));
        }
        Err(e) => {
            return Err(AppError::Internal(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            )));
        }
    };

    tracing::debug!(export = %filename, user = %user.username, bytes = bytes.len(), "Serving export");

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}.csv\"", filename),
            ),
        ],
        bytes,
    )
        .into_response())
}

async fn update_file(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(body): ApiJson<RefreshRequest>,
) -> AppResult<Json<Value>> {
    if !is_valid_export_name(&body.filename) {
        return Err(AppError::not_found(format!("Export '{}'", body.filename)));
    }
    authorize(&state, &user, &body.filename).await?;

    tracing::info!(
        export = %body.filename,
        backend = %body.db,
        user = %user.username,
        "Refresh requested"
    );
    let report = state.coordinator.refresh(body.db, &body.filename).await?;

    Ok(Json(json!({
        "message": format!("File {} updated successfully", body.filename),
        "report": report,
    })))
}

/// The export must be in the catalog and visible to the caller
async fn authorize(state: &AppState, user: &AuthUser, name: &str) -> AppResult<()> {
    let descriptor = state
        .metadata
        .find_by_name(name)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Export '{}'", name)))?;

    if !can_access(user.role, &descriptor) {
        return Err(AppError::Forbidden(format!(
            "Role {} cannot access '{}'",
            user.role, name
        )));
    }
    Ok(())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/files", get(list_files).put(update_file))
        .route("/files/", put(update_file))
        .route("/download", post(download_file))
        .route("/download/", post(download_file))
}
