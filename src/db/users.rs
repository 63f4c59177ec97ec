//! Users repository for authentication

use sqlx::PgPool;

use crate::error::{AppError, AppResult};
use crate::exports::BackendKind;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRecord {
    pub id: i32,
    pub username: String,
    pub hashed_password: String,
    pub role: String,
}

#[derive(Debug, Clone)]
pub struct CreateUser {
    pub username: String,
    pub hashed_password: String,
    pub role: String,
}

#[derive(Debug)]
pub struct UsersRepository {
    pool: PgPool,
}

impl UsersRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_by_username(&self, username: &str) -> AppResult<Option<UserRecord>> {
        sqlx::query_as::<_, UserRecord>(
            "SELECT id, username, hashed_password, role FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)
    }

    /// Insert a user; a taken username is a [AppError::Conflict]
    pub async fn create(&self, input: CreateUser) -> AppResult<UserRecord> {
        sqlx::query_as::<_, UserRecord>(
            r#"
            INSERT INTO users (username, hashed_password, role)
            VALUES ($1, $2, $3)
            RETURNING id, username, hashed_password, role
            "#,
        )
        .bind(&input.username)
        .bind(&input.hashed_password)
        .bind(&input.role)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AppError::Conflict("Username already exists".to_string())
            }
            other => db_error(other),
        })
    }

    /// Check if any admin user exists
    pub async fn has_admin(&self) -> AppResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = 'admin'")
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(count > 0)
    }
}

/// An unreachable users database is a 503 like any other backend outage
pub(crate) fn db_error(e: sqlx::Error) -> AppError {
    match e {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => AppError::Connection {
            backend: BackendKind::Primary,
            source: e,
        },
        other => AppError::Internal(format!("Database error: {}", other)),
    }
}
