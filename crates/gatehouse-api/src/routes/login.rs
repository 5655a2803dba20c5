//! # Login Endpoints
//!
//! | Method | Path | Auth |
//! |---|---|---|
//! | POST | `/v1/login/access-token` | none, rate-limited |
//! | POST | `/v1/login/refresh` | refresh token in body |
//! | POST | `/v1/logout` | refresh token in body |

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::routing::post;
use axum::{Extension, Json, Router};
use chrono::Utc;
use serde::Deserialize;

use crate::error::AppError;
use crate::extractors::{extract_validated_json, require_non_blank, Validate};
use crate::gate::TokenPair;
use crate::middleware::rate_limit::{rate_limit_middleware, RateLimiter};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl Validate for LoginRequest {
    fn validate(&self) -> Result<(), String> {
        require_non_blank("username", &self.username)?;
        if self.password.is_empty() {
            return Err("password must not be empty".into());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

impl Validate for RefreshRequest {
    fn validate(&self) -> Result<(), String> {
        require_non_blank("refresh_token", &self.refresh_token)
    }
}

/// Build the login router. Only the credential endpoint is rate-limited.
pub fn router(limiter: RateLimiter) -> Router<AppState> {
    let credential_login = Router::new()
        .route("/v1/login/access-token", post(login_access_token))
        .route_layer(from_fn(rate_limit_middleware))
        .route_layer(Extension(limiter));

    Router::new()
        .merge(credential_login)
        .route("/v1/login/refresh", post(refresh))
        .route("/v1/logout", post(logout))
}

/// POST /v1/login/access-token — Exchange credentials for a token pair.
async fn login_access_token(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<TokenPair>, AppError> {
    let req = extract_validated_json(body)?;
    let pair = state
        .gate
        .login(&req.username, &req.password, Utc::now())
        .await?;
    Ok(Json(pair))
}

/// POST /v1/login/refresh — Rotate a refresh token.
async fn refresh(
    State(state): State<AppState>,
    body: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<TokenPair>, AppError> {
    let req = extract_validated_json(body)?;
    let pair = state.gate.refresh(&req.refresh_token, Utc::now()).await?;
    Ok(Json(pair))
}

/// POST /v1/logout — Revoke a refresh token.
async fn logout(
    State(state): State<AppState>,
    body: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<StatusCode, AppError> {
    let req = extract_validated_json(body)?;
    state.gate.logout(&req.refresh_token, Utc::now())?;
    Ok(StatusCode::NO_CONTENT)
}
