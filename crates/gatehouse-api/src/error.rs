//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps gate, token, and admission errors to HTTP status codes and JSON
//! bodies of the form `{"error": {"code": ..., "message": ...}}`.
//!
//! Internal failures and token-invalidity reasons are logged, never
//! returned. Every 401 carries `WWW-Authenticate: Bearer`.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use gatehouse_core::AdmissionError;
use gatehouse_crypto::TokenError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gate::AuthError;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "TOKEN_EXPIRED", "VALIDATION_ERROR").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Request validation failed (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// Request body could not be parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or malformed `Authorization` header (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Login failed (401). One message for every cause.
    #[error("incorrect username or password")]
    AuthenticationFailed,

    /// Access or refresh token past its expiry (401).
    #[error("token has expired")]
    TokenExpired,

    /// Token failed verification (401). The reason stays in the logs.
    #[error("invalid token: {0}")]
    TokenInvalid(String),

    /// Authorization failure: insufficient role (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// `Origin` not in the configured CORS origins (403).
    #[error("origin not allowed")]
    OriginNotAllowed,

    /// `Host` missing or not in the configured hosts (400).
    #[error("invalid host header")]
    HostNotAllowed,

    /// Conflict with current resource state (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Too many attempts in the current window (429).
    #[error("rate limit exceeded")]
    RateLimited { retry_after_secs: u64 },

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Return the HTTP status code and machine-readable error code for this error.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::AuthenticationFailed => (StatusCode::UNAUTHORIZED, "AUTHENTICATION_FAILED"),
            Self::TokenExpired => (StatusCode::UNAUTHORIZED, "TOKEN_EXPIRED"),
            Self::TokenInvalid(_) => (StatusCode::UNAUTHORIZED, "TOKEN_INVALID"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::OriginNotAllowed => (StatusCode::FORBIDDEN, "ORIGIN_NOT_ALLOWED"),
            Self::HostNotAllowed => (StatusCode::BAD_REQUEST, "HOST_NOT_ALLOWED"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    /// Message safe to show the client.
    fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            Self::TokenInvalid(_) => "could not validate credentials".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        match &self {
            Self::Internal(_) => tracing::error!(error = %self, "internal server error"),
            Self::TokenInvalid(reason) => tracing::debug!(%reason, "token rejected"),
            _ => {}
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.public_message(),
                details: None,
            },
        };

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        if let Self::RateLimited { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => Self::TokenExpired,
            TokenError::Invalid(reason) => Self::TokenInvalid(reason),
            TokenError::Issuance(msg) => Self::Internal(msg),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::AuthenticationFailed => Self::AuthenticationFailed,
            AuthError::Token(token) => Self::from(token),
            AuthError::IdentifierTaken => {
                Self::Conflict("a user with this username already exists".into())
            }
            AuthError::Policy(msg) => Self::Validation(msg),
            AuthError::UnknownUser => Self::NotFound("user not found".into()),
            AuthError::InactiveAccount => Self::Forbidden("account is inactive".into()),
            AuthError::Internal(msg) => Self::Internal(msg),
        }
    }
}

impl From<AdmissionError> for AppError {
    fn from(err: AdmissionError) -> Self {
        match err {
            AdmissionError::OriginNotAllowed => Self::OriginNotAllowed,
            AdmissionError::HostNotAllowed => Self::HostNotAllowed,
        }
    }
}
