//! Authentication service for user management and JWT handling
//!
//! Provides:
//! - User registration and login
//! - Password hashing with bcrypt
//! - Access/refresh token generation and validation

use bcrypt::{hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::db::{CreateUser, Database, UserRecord};
use crate::error::{AppError, AppResult};
use crate::exports::Role;

pub const ACCESS_TOKEN_TYPE: &str = "access_token";
pub const REFRESH_TOKEN_TYPE: &str = "refresh_token";

// ============================================================================
// JWT Claims
// ============================================================================

/// Claims carried by both token kinds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Username
    pub sub: String,
    /// `access_token` or `refresh_token`
    pub token_type: String,
    /// Caller role; access tokens only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Expiration timestamp
    pub exp: i64,
}

/// Identity resolved from a valid access token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub username: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Token signing secret
    pub secret: String,
    /// HMAC algorithm used to sign and verify tokens
    pub algorithm: Algorithm,
    pub access_token_lifetime: Duration,
    pub refresh_token_lifetime: Duration,
    pub bcrypt_cost: u32,
}

// ============================================================================
// Auth Service
// ============================================================================

#[derive(Clone)]
pub struct AuthService {
    db: Database,
    config: AuthConfig,
    default_role: Role,
}

impl AuthService {
    pub fn new(db: Database, config: AuthConfig, default_role: Role) -> Self {
        Self {
            db,
            config,
            default_role,
        }
    }

    /// Register a new user. The first user becomes admin.
    pub async fn register(&self, username: &str, password: &str) -> AppResult<UserRecord> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(AppError::InvalidRequest(
                "Username and password are required".to_string(),
            ));
        }

        let users = self.db.users().await?;
        if users.get_by_username(username).await?.is_some() {
            return Err(AppError::Conflict("Username already exists".to_string()));
        }

        let role = if users.has_admin().await? {
            self.default_role
        } else {
            tracing::info!("Creating first admin user: {}", username);
            Role::Admin
        };

        let hashed_password = self.hash_password(password)?;
        users
            .create(CreateUser {
                username: username.to_string(),
                hashed_password,
                role: role.to_string(),
            })
            .await
    }

    /// Login with username and password
    pub async fn login(&self, username: &str, password: &str) -> AppResult<LoginTokens> {
        let invalid = || AppError::unauthorized("Invalid username or password");

        let user = self
            .db
            .users()
            .await?
            .get_by_username(username)
            .await?
            .ok_or_else(invalid)?;

        if !self.verify_password(password, &user.hashed_password)? {
            return Err(invalid());
        }

        let role: Role = user.role.parse()?;
        Ok(LoginTokens {
            access_token: self.create_access_token(&user.username, role)?,
            refresh_token: self.create_refresh_token(&user.username)?,
            token_type: "bearer",
        })
    }

    /// Mint a new access token from a refresh token. The role is re-read so
    /// role changes apply on the next refresh.
    pub async fn refresh_access_token(&self, refresh_token: &str) -> AppResult<String> {
        let claims = self
            .decode(refresh_token)
            .map_err(|_| AppError::unauthorized("Invalid or expired refresh token"))?;
        if claims.token_type != REFRESH_TOKEN_TYPE {
            return Err(AppError::unauthorized("Invalid token"));
        }

        let user = self
            .db
            .users()
            .await?
            .get_by_username(&claims.sub)
            .await?
            .ok_or_else(|| AppError::unauthorized("Invalid token"))?;

        self.create_access_token(&user.username, user.role.parse()?)
    }

    // ========================================================================
    // Tokens
    // ========================================================================

    pub fn create_access_token(&self, username: &str, role: Role) -> AppResult<String> {
        self.sign(Claims {
            sub: username.to_string(),
            token_type: ACCESS_TOKEN_TYPE.to_string(),
            role: Some(role.to_string()),
            exp: (Utc::now() + self.config.access_token_lifetime).timestamp(),
        })
    }

    pub fn create_refresh_token(&self, username: &str) -> AppResult<String> {
        self.sign(Claims {
            sub: username.to_string(),
            token_type: REFRESH_TOKEN_TYPE.to_string(),
            role: None,
            exp: (Utc::now() + self.config.refresh_token_lifetime).timestamp(),
        })
    }

    /// Validate an access token for a protected route
    pub fn verify_access_token(&self, token: &str) -> AppResult<AuthUser> {
        let claims = self
            .decode(token)
            .map_err(|_| AppError::unauthorized("Token has expired or is invalid"))?;

        if claims.token_type != ACCESS_TOKEN_TYPE {
            return Err(AppError::unauthorized(
                "Refresh token cannot be used for protected routes",
            ));
        }
        if claims.sub.is_empty() {
            return Err(AppError::unauthorized("Invalid token"));
        }

        let role = claims
            .role
            .as_deref()
            .ok_or_else(|| AppError::unauthorized("Invalid token"))?
            .parse()?;

        Ok(AuthUser {
            username: claims.sub,
            role,
        })
    }

    fn sign(&self, claims: Claims) -> AppResult<String> {
        encode(
            &Header::new(self.config.algorithm),
            &claims,
            &EncodingKey::from_secret(self.config.secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }

    fn decode(&self, token: &str) -> jsonwebtoken::errors::Result<Claims> {
        let mut validation = Validation::new(self.config.algorithm);
        validation.validate_exp = true;
        validation.leeway = 0;

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
    }

    // ========================================================================
    // Passwords
    // ========================================================================

    fn hash_password(&self, password: &str) -> AppResult<String> {
        hash(password, self.config.bcrypt_cost)
            .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
    }

    fn verify_password(&self, password: &str, hash: &str) -> AppResult<bool> {
        verify(password, hash)
            .map_err(|e| AppError::Internal(format!("Failed to verify password: {}", e)))
    }
}
