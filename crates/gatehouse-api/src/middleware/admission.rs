//! # Origin / Host Admission Middleware
//!
//! Wraps the whole router, fallback and health probes included, so a
//! request from a foreign origin or with an unknown `Host` is rejected
//! before routing. The guard arrives as an `Extension<Arc<AdmissionGuard>>`;
//! without it every request is refused.

use std::sync::Arc;

use axum::extract::Request;
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use gatehouse_core::AdmissionGuard;

use crate::error::AppError;

pub async fn admission_middleware(request: Request, next: Next) -> Response {
    let Some(guard) = request.extensions().get::<Arc<AdmissionGuard>>().cloned() else {
        tracing::error!("admission middleware mounted without AdmissionGuard extension");
        return AppError::Internal("admission is not configured".into()).into_response();
    };

    // A header that is not valid visible ASCII cannot match any allowlist
    // entry; an empty string keeps it "present but wrong".
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .map(|v| v.to_str().unwrap_or(""));
    // HTTP/2 carries the host in the URI authority instead.
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| request.uri().authority().map(|a| a.as_str()));

    if let Err(e) = guard.check(origin, host) {
        tracing::warn!(
            error = %e,
            origin = origin.unwrap_or("-"),
            host = host.unwrap_or("-"),
            method = %request.method(),
            path = request.uri().path(),
            "request rejected by admission guard"
        );
        return AppError::from(e).into_response();
    }

    next.run(request).await
}
