//! # Account Endpoints
//!
//! | Method | Path | Auth |
//! |---|---|---|
//! | POST | `/v1/users` | none; only when open registration is enabled |
//! | GET | `/v1/users/me` | bearer |
//! | PUT | `/v1/users/me/password` | bearer |
//! | GET | `/v1/users/:id` | bearer; own record or superuser |

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use gatehouse_core::{check_password_policy, Role};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::auth::{require_role, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_validated_json, require_non_blank, Validate};
use crate::gate::NewUser;
use crate::state::AppState;
use crate::store::UserRecord;

/// Public view of an account. Never includes the digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub full_name: Option<String>,
    pub is_active: bool,
    pub is_superuser: bool,
    pub created_at: DateTime<Utc>,
}

impl From<UserRecord> for UserProfile {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.id,
            username: user.identifier,
            full_name: user.full_name,
            is_active: user.is_active,
            is_superuser: user.is_superuser,
            created_at: user.created_at,
        }
    }
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub full_name: Option<String>,
}

impl Validate for RegisterRequest {
    fn validate(&self) -> Result<(), String> {
        require_non_blank("username", &self.username)?;
        check_password_policy(&self.password)
    }
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    /// The current password.
    pub original: String,
    pub password: String,
}

impl Validate for ChangePasswordRequest {
    fn validate(&self) -> Result<(), String> {
        if self.original.is_empty() {
            return Err("original must not be empty".into());
        }
        check_password_policy(&self.password)
    }
}

/// Unauthenticated account routes.
pub fn public_router() -> Router<AppState> {
    Router::new().route("/v1/users", post(register))
}

/// Routes that expect the bearer middleware in front of them.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/users/me", get(read_me))
        .route("/v1/users/me/password", put(change_password))
        .route("/v1/users/:id", get(read_user))
}

/// POST /v1/users — Open registration.
async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserProfile>), AppError> {
    if !state.settings.open_registration {
        return Err(AppError::Forbidden("open registration is disabled".into()));
    }
    let req = extract_validated_json(body)?;
    let user = state
        .gate
        .register(NewUser {
            identifier: req.username,
            password: Zeroizing::new(req.password),
            full_name: req.full_name,
            is_superuser: false,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// GET /v1/users/me — The caller's own profile.
async fn read_me(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<UserProfile>, AppError> {
    let user = state.gate.principal_user(&caller).await?;
    Ok(Json(user.into()))
}

/// PUT /v1/users/me/password — Change the caller's password.
async fn change_password(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<StatusCode, AppError> {
    let req = extract_validated_json(body)?;
    let user = state.gate.principal_user(&caller).await?;
    state
        .gate
        .change_password(user.id, &req.original, &req.password)
        .await
        .map_err(|e| match e {
            // A wrong current password is a bad request here, not a login
            // failure; the caller is already authenticated.
            crate::gate::AuthError::AuthenticationFailed => {
                AppError::BadRequest("incorrect password".into())
            }
            other => other.into(),
        })?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /v1/users/:id — The caller's own account, or any account for superusers.
async fn read_user(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<UserProfile>, AppError> {
    let me = state.gate.principal_user(&caller).await?;
    if me.id == id {
        return Ok(Json(me.into()));
    }
    require_role(&caller, Role::Superuser)?;
    let user = state.gate.user(id).await?;
    Ok(Json(user.into()))
}
