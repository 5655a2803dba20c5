//! # Bearer Authentication Middleware
//!
//! Parses `Authorization: Bearer <token>`, verifies the token through the
//! [`AuthGate`], and injects a [`CallerIdentity`] into the request
//! extensions. Handlers extract it via the `FromRequestParts` impl and
//! gate on role with [`require_role`].
//!
//! The gate reaches the middleware as an [`axum::Extension`] holding
//! [`BearerAuth`]. If the extension is missing the middleware rejects the
//! request rather than letting it through unauthenticated.

use std::ops::Deref;
use std::sync::Arc;

use axum::extract::Request;
use axum::http::header;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use gatehouse_core::{Principal, Role};

use crate::error::AppError;
use crate::gate::AuthGate;

/// Identity of the authenticated caller, resolved from a verified access
/// token for the duration of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity(pub Principal);

impl Deref for CallerIdentity {
    type Target = Principal;

    fn deref(&self) -> &Principal {
        &self.0
    }
}

#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("not authenticated".into()))
    }
}

/// Check that the caller has at least the required role.
/// Returns 403 Forbidden if the caller's role is insufficient.
pub fn require_role(caller: &CallerIdentity, minimum: Role) -> Result<(), AppError> {
    if caller.has_role(minimum) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "role '{}' required, caller has '{}'",
            minimum.as_str(),
            caller.role.as_str()
        )))
    }
}

/// Gate handle injected into request extensions for [`auth_middleware`].
#[derive(Clone, Debug)]
pub struct BearerAuth {
    pub gate: Arc<AuthGate>,
}

/// Extract the token from an `Authorization` header value.
///
/// The scheme is case-insensitive; the token itself must be non-empty and
/// contain no whitespace.
pub fn bearer_token(header_value: &str) -> Result<&str, &'static str> {
    let (scheme, token) = header_value
        .split_once(' ')
        .ok_or("authorization header must use Bearer scheme")?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err("authorization header must use Bearer scheme");
    }
    let token = token.trim();
    if token.is_empty() || token.contains(char::is_whitespace) {
        return Err("malformed bearer token");
    }
    Ok(token)
}

pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let Some(auth) = request.extensions().get::<BearerAuth>().cloned() else {
        tracing::error!("bearer middleware mounted without BearerAuth extension");
        return AppError::Internal("authentication is not configured".into()).into_response();
    };

    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .map(|v| v.to_str().map_err(|_| "authorization header is not valid ASCII"));

    let token = match header_value {
        Some(Ok(value)) => match bearer_token(value) {
            Ok(token) => token,
            Err(msg) => {
                tracing::warn!(reason = msg, "authentication failed");
                return AppError::Unauthorized(msg.into()).into_response();
            }
        },
        Some(Err(msg)) => {
            tracing::warn!(reason = msg, "authentication failed");
            return AppError::Unauthorized(msg.into()).into_response();
        }
        None => {
            tracing::warn!("authentication failed: missing authorization header");
            return AppError::Unauthorized("missing authorization header".into()).into_response();
        }
    };

    match auth.gate.authorize(token, Utc::now()) {
        Ok(principal) => {
            request.extensions_mut().insert(CallerIdentity(principal));
            next.run(request).await
        }
        Err(e) => {
            tracing::warn!(error = %e, "authentication failed: token rejected");
            AppError::from(e).into_response()
        }
    }
}
