//! # Request Middleware
//!
//! - `admission` — pre-routing `Origin` / `Host` allowlist enforcement.
//! - `rate_limit` — fixed-window login attempt limiting.

pub mod admission;
pub mod rate_limit;
