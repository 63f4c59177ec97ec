//! Error taxonomy shared by the export core and the HTTP layer
//!
//! Every [AppError] variant maps to one HTTP status code and is rendered as
//! `{"error": CODE, "detail": message}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::exports::BackendKind;

pub type AppResult<T> = std::result::Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Missing query text, metadata record, catalog entry, data file or user
    #[error("{0} not found")]
    NotFound(String),

    /// Unknown role, or an invalid/expired/wrong-type token
    #[error("{0}")]
    Unauthorized(String),

    /// Authenticated, but the caller's role may not touch this export
    #[error("{0}")]
    Forbidden(String),

    #[error("File {name} was refreshed less than {cooldown_secs} seconds ago, retry in {retry_after_secs}s")]
    TooSoon {
        name: String,
        cooldown_secs: i64,
        retry_after_secs: i64,
    },

    #[error("Error connecting to {backend} database: {source}")]
    Connection {
        backend: BackendKind,
        #[source]
        source: sqlx::Error,
    },

    #[error("Error executing query on {backend}: {source}")]
    Query {
        backend: BackendKind,
        #[source]
        source: sqlx::Error,
    },

    #[error("Error writing data file for {name}: {source}")]
    Write {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Error persisting metadata for {name}: {reason}")]
    Persist { name: String, reason: String },

    #[error("Metadata record is malformed: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    /// Stable machine-readable code for the response body.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::TooSoon { .. } => "TOO_SOON",
            AppError::Connection { .. } => "CONNECTION_ERROR",
            AppError::Query { .. } => "QUERY_ERROR",
            AppError::Write { .. } => "WRITE_ERROR",
            AppError::Persist { .. } => "PERSIST_ERROR",
            AppError::Corrupt(_) => "CORRUPT_METADATA",
            AppError::InvalidRequest(_) => "INVALID_REQUEST",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::TooSoon { .. } | AppError::InvalidRequest(_) | AppError::Conflict(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Connection { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Query { .. }
            | AppError::Write { .. }
            | AppError::Persist { .. }
            | AppError::Corrupt(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "Request failed");
        } else {
            tracing::debug!(code = self.code(), error = %self, "Request rejected");
        }

        let body = ErrorBody {
            error: self.code(),
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_are_4xx() {
        let too_soon = AppError::TooSoon {
            name: "sales_q1".to_string(),
            cooldown_secs: 180,
            retry_after_secs: 120,
        };
        assert_eq!(too_soon.status_code(), StatusCode::BAD_REQUEST);
        assert!(too_soon.to_string().contains("sales_q1"));

        assert_eq!(
            AppError::unauthorized("Unauthorized user").status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::not_found("Query for sales_q1").status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_backend_and_storage_errors_are_5xx() {
        let query = AppError::Query {
            backend: BackendKind::Primary,
            source: sqlx::Error::Protocol("relation does not exist".into()),
        };
        assert_eq!(query.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(query.to_string().contains("relation does not exist"));

        let write = AppError::Write {
            name: "sales_q1".into(),
            source: std::io::Error::other("disk full"),
        };
        assert_eq!(write.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let conn = AppError::Connection {
            backend: BackendKind::Secondary,
            source: sqlx::Error::PoolTimedOut,
        };
        assert_eq!(conn.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
