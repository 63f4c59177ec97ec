//! Database connection for the service's own tables (users)

pub mod users;

use std::sync::Arc;

use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tokio::sync::OnceCell;
use tracing::info;

use crate::backends::PoolSettings;
use crate::error::{AppError, AppResult};

pub use users::{CreateUser, UserRecord, UsersRepository};

const USERS_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS users (
        id SERIAL PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        hashed_password TEXT NOT NULL,
        role TEXT NOT NULL DEFAULT 'A',
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
"#;

/// Database wrapper providing connection pool access
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
}

impl Database {
    /// Create a new database wrapper from an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
        }
    }

    /// Build the pool without connecting; connections open on first use so the
    /// service can start while the database is still coming up.
    pub fn connect_lazy(settings: &PoolSettings) -> Self {
        let options = PgConnectOptions::new()
            .host(&settings.host)
            .port(settings.port)
            .database(&settings.database)
            .username(&settings.user)
            .password(&settings.password);

        let pool = PgPoolOptions::new()
            .max_connections(settings.max_size)
            .acquire_timeout(settings.acquire_timeout)
            .connect_lazy_with(options);

        Self::new(pool)
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get a users repository, creating the table first if that has not
    /// succeeded yet
    pub async fn users(&self) -> AppResult<UsersRepository> {
        self.ensure_schema().await?;
        Ok(UsersRepository::new(self.pool.clone()))
    }

    /// Create the users table if it does not exist yet. Runs once per process
    /// on success; a failed attempt is retried by the next caller.
    pub async fn ensure_schema(&self) -> AppResult<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(USERS_SQL.trim())
                    .execute(&self.pool)
                    .await
                    .map_err(users::db_error)?;
                info!("Users table ready");
                Ok::<_, AppError>(())
            })
            .await
            .map(|_| ())
    }

    pub fn is_schema_ready(&self) -> bool {
        self.schema_ready.initialized()
    }
}
