//! # API Route Modules
//!
//! - `login` — token issuance, refresh, and logout.
//! - `users` — registration and account endpoints.

pub mod login;
pub mod users;
