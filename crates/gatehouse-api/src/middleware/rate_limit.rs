//! # Login Rate Limiting
//!
//! Fixed-window counter keyed by client address. In-memory and
//! process-local; a multi-instance deployment limits per instance.
//!
//! The client address is the TCP peer from [`ConnectInfo`], so the server
//! must be run with `into_make_service_with_connect_info::<SocketAddr>()`.
//! `X-Forwarded-For` is consulted only when the peer is a configured
//! trusted proxy. Hops are read right to left and the first one not
//! belonging to a trusted proxy is the client.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use gatehouse_core::RateLimitSettings;
use parking_lot::Mutex;

use crate::error::AppError;

/// Buckets above this count trigger a sweep of expired windows.
const SWEEP_THRESHOLD: usize = 10_000;

/// Bucket for requests that arrive without a peer address.
const UNKNOWN_PEER: &str = "unknown-peer";

#[derive(Debug, Clone)]
struct BucketState {
    count: u64,
    window_start: Instant,
}

/// Shared rate limiter state.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitSettings,
    buckets: Arc<Mutex<HashMap<String, BucketState>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitSettings) -> Self {
        Self {
            config,
            buckets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Count one attempt for `key`. On refusal returns how long until the
    /// window resets.
    pub fn check(&self, key: &str) -> Result<(), Duration> {
        self.check_at(key, Instant::now())
    }

    /// Resolve the bucket key for a request.
    pub fn client_key(&self, request: &Request) -> String {
        let Some(ConnectInfo(peer)) = request.extensions().get::<ConnectInfo<SocketAddr>>() else {
            return UNKNOWN_PEER.to_string();
        };
        let trusted = &self.config.trusted_proxies;
        let mut client = peer.ip();
        if trusted.contains(&client) {
            let hops: Vec<&str> = request
                .headers()
                .get_all("x-forwarded-for")
                .iter()
                .filter_map(|v| v.to_str().ok())
                .flat_map(|v| v.split(','))
                .map(str::trim)
                .collect();
            for hop in hops.iter().rev() {
                let Ok(ip) = hop.parse::<IpAddr>() else {
                    break;
                };
                client = ip;
                if !trusted.contains(&ip) {
                    break;
                }
            }
        }
        client.to_string()
    }

    fn check_at(&self, key: &str, now: Instant) -> Result<(), Duration> {
        let window = self.config.window;
        let mut buckets = self.buckets.lock();

        if buckets.len() > SWEEP_THRESHOLD {
            buckets.retain(|_, b| now.duration_since(b.window_start) < window);
        }

        let bucket = buckets.entry(key.to_string()).or_insert(BucketState {
            count: 0,
            window_start: now,
        });

        if now.duration_since(bucket.window_start) >= window {
            bucket.count = 0;
            bucket.window_start = now;
        }

        if bucket.count >= self.config.max_attempts {
            Err(window.saturating_sub(now.duration_since(bucket.window_start)))
        } else {
            bucket.count += 1;
            Ok(())
        }
    }
}

/// Middleware that enforces the login attempt limit.
pub async fn rate_limit_middleware(request: Request, next: Next) -> Response {
    let limiter = request.extensions().get::<RateLimiter>().cloned();

    if let Some(limiter) = limiter {
        let key = limiter.client_key(&request);
        if let Err(retry_after) = limiter.check(&key) {
            tracing::warn!(client = %key, "login rate limit exceeded");
            return AppError::RateLimited {
                retry_after_secs: retry_after.as_secs().max(1),
            }
            .into_response();
        }
    }

    next.run(request).await
}
