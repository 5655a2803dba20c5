//! # gatehouse-api — Axum Adapters for the Gatehouse Security Layer
//!
//! Puts the admission guard, credential hasher, and token issuer in front
//! of an Axum router, and exposes the login and account endpoints that
//! exercise them.
//!
//! ## API Surface
//!
//! | Prefix | Module | Auth |
//! |---|---|---|
//! | `/health/*` | this module | none |
//! | `/v1/login/*`, `/v1/logout` | [`routes::login`] | none / refresh token |
//! | `POST /v1/users` | [`routes::users`] | none |
//! | `/v1/users/me*`, `/v1/users/:id` | [`routes::users`] | bearer |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → Admission → CORS → [Bearer auth | Rate limit] → Handler
//! ```
//!
//! Admission wraps everything, health probes and the 404 fallback
//! included.

pub mod auth;
pub mod error;
pub mod extractors;
pub mod gate;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod store;

use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::middleware::from_fn;
use axum::Router;
use gatehouse_core::AdmissionGuard;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::BearerAuth;
use crate::middleware::rate_limit::RateLimiter;
use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
pub fn app(state: AppState) -> Router {
    let guard = Arc::new(AdmissionGuard::from_settings(&state.settings));
    let cors = cors_layer(&guard);
    let limiter = RateLimiter::new(state.settings.login_rate_limit.clone());
    let bearer = BearerAuth {
        gate: Arc::clone(&state.gate),
    };

    // Bearer-protected routes. `route_layer` keeps unmatched paths at 404.
    let protected = routes::users::router()
        .route_layer(from_fn(auth::auth_middleware))
        .route_layer(axum::Extension(bearer));

    let health = Router::new()
        .route("/health/liveness", axum::routing::get(liveness))
        .route("/health/readiness", axum::routing::get(readiness));

    Router::new()
        .merge(health)
        .merge(routes::login::router(limiter))
        .merge(routes::users::public_router())
        .merge(protected)
        .with_state(state)
        .layer(cors)
        .layer(from_fn(middleware::admission::admission_middleware))
        .layer(axum::Extension(guard))
        .layer(TraceLayer::new_for_http())
}

/// CORS response headers for the same origins the guard admits.
fn cors_layer(guard: &AdmissionGuard) -> CorsLayer {
    let origins: Vec<HeaderValue> = guard
        .origins()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

/// Liveness probe — always returns 200 if the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe — returns 200 when the application is ready to serve.
async fn readiness() -> &'static str {
    "ready"
}
