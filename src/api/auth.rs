//! Registration, login and token endpoints

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};

use super::extract::ApiJson;
use crate::app::AppState;
use crate::error::AppResult;
use crate::services::auth::AuthUser;

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenRefreshRequest {
    pub refresh_token: String,
}

async fn create_user(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<Credentials>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let user = state.auth.register(&body.username, &body.password).await?;
    tracing::info!(username = %user.username, role = %user.role, "User created");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "User has been created", "username": user.username })),
    ))
}

async fn login(State(state): State<AppState>, ApiJson(body): ApiJson<Credentials>) -> AppResult<Json<Value>> {
    let tokens = state.auth.login(&body.username, &body.password).await?;
    Ok(Json(json!(tokens)))
}

async fn refresh_token(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<TokenRefreshRequest>,
) -> AppResult<Json<Value>> {
    let access_token = state.auth.refresh_access_token(&body.refresh_token).await?;
    Ok(Json(json!({ "access_token": access_token, "token_type": "bearer" })))
}

async fn protected(user: AuthUser) -> Json<Value> {
    Json(json!({ "message": format!("Hello, {}! You are authenticated.", user.username) }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", post(create_user))
        .route("/users/", post(create_user))
        .route("/login", post(login))
        .route("/token/refresh", post(refresh_token))
        .route("/protected", get(protected))
}
