//! Application configuration management

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use jsonwebtoken::Algorithm;

use crate::backends::PoolSettings;
use crate::exports::Role;
use crate::services::auth::AuthConfig;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,

    /// PostgreSQL: export queries and the users table
    pub postgres: PoolSettings,

    /// MySQL: materialized exports
    pub mysql: PoolSettings,

    /// Schema holding the tables MySQL refresh statements materialize
    pub mysql_readback_schema: String,

    /// Token signing and password hashing
    pub auth: AuthConfig,

    /// Role given to users registered after the first admin
    pub default_user_role: Role,

    /// Directory holding `<export>.csv` files
    pub data_dir: PathBuf,

    /// Directory holding `postgres/` and `mysql/` query files
    pub query_dir: PathBuf,

    /// Export metadata record
    pub metadata_path: PathBuf,

    /// Minimum time between two refreshes of one export
    pub refresh_cooldown: Duration,

    /// Allowed browser origins
    pub cors_origins: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let data_dir = PathBuf::from(env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string()));
        let metadata_path = env::var("METADATA_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("file_metadata.json"));

        Ok(Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .context("Invalid PORT")?,

            postgres: pool_settings_from_env("DB", 5432)?,
            mysql: pool_settings_from_env("MYSQL_DB", 3306)?,

            mysql_readback_schema: env::var("MYSQL_READBACK_SCHEMA").unwrap_or_else(|_| "mv".to_string()),

            auth: auth_config_from_env()?,

            default_user_role: env::var("DEFAULT_USER_ROLE")
                .unwrap_or_else(|_| "A".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid DEFAULT_USER_ROLE, expected admin, A or B"))?,

            data_dir,
            query_dir: PathBuf::from(env::var("QUERY_DIR").unwrap_or_else(|_| "./queries".to_string())),
            metadata_path,

            refresh_cooldown: Duration::from_secs(
                env::var("REFRESH_COOLDOWN_SECS")
                    .unwrap_or_else(|_| "180".to_string())
                    .parse()
                    .context("Invalid REFRESH_COOLDOWN_SECS")?,
            ),

            cors_origins: env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:8080,http://localhost:5173".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        })
    }
}

/// Read `<PREFIX>_HOST`, `<PREFIX>_DATABASE`, `<PREFIX>_USER`, `<PREFIX>_PASSWORD`,
/// `<PREFIX>_PORT`, `<PREFIX>_POOL_MIN_SIZE` and `<PREFIX>_POOL_MAX_SIZE`.
fn pool_settings_from_env(prefix: &str, default_port: u16) -> Result<PoolSettings> {
    let var = |name: &str| format!("{}_{}", prefix, name);
    let required = |name: &str| {
        let key = var(name);
        env::var(&key).with_context(|| format!("{} is required", key))
    };

    let min_size: u32 = env::var(var("POOL_MIN_SIZE"))
        .unwrap_or_else(|_| "1".to_string())
        .parse()
        .with_context(|| format!("Invalid {}", var("POOL_MIN_SIZE")))?;
    let max_size: u32 = env::var(var("POOL_MAX_SIZE"))
        .unwrap_or_else(|_| "5".to_string())
        .parse()
        .with_context(|| format!("Invalid {}", var("POOL_MAX_SIZE")))?;
    if max_size == 0 || min_size > max_size {
        bail!(
            "{} must be at least 1 and not below {}",
            var("POOL_MAX_SIZE"),
            var("POOL_MIN_SIZE")
        );
    }

    Ok(PoolSettings {
        host: required("HOST")?,
        port: match env::var(var("PORT")) {
            Ok(port) => port.parse().with_context(|| format!("Invalid {}", var("PORT")))?,
            Err(_) => default_port,
        },
        database: required("DATABASE")?,
        user: required("USER")?,
        password: required("PASSWORD")?,
        min_size,
        max_size,
        acquire_timeout: Duration::from_secs(30),
    })
}

fn auth_config_from_env() -> Result<AuthConfig> {
    let secret = env::var("SECRET_KEY").context("SECRET_KEY is required")?;
    let algorithm: Algorithm = env::var("ALGORITHM")
        .unwrap_or_else(|_| "HS256".to_string())
        .parse()
        .context("Invalid ALGORITHM")?;
    if !matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
        bail!("ALGORITHM must be one of HS256, HS384, HS512");
    }

    let minutes = |key: &str, default: i64| -> Result<i64> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse()
            .with_context(|| format!("Invalid {}", key))
    };

    Ok(AuthConfig {
        secret,
        algorithm,
        access_token_lifetime: chrono::Duration::minutes(minutes("ACCESS_TOKEN_EXPIRE_MINUTES", 30)?),
        refresh_token_lifetime: chrono::Duration::minutes(minutes("REFRESH_TOKEN_EXPIRE_MINUTES", 7 * 24 * 60)?),
        bcrypt_cost: env::var("BCRYPT_COST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(bcrypt::DEFAULT_COST),
    })
}
