//! # gatehouse-core — Foundational Types for Gatehouse
//!
//! The leaf crate of the workspace. It owns everything that the security
//! layer needs before any cryptography or HTTP is involved:
//!
//! - [`Settings`] — the single immutable configuration value, loaded once
//!   from the environment and shared as `Arc<Settings>`.
//! - [`SecretKey`] — the process signing secret. Redacted in `Debug`,
//!   zeroized on drop, compared in constant time.
//! - [`AdmissionGuard`] — exact-membership `Origin` / `Host` admission.
//! - [`Principal`], [`Role`], [`GrantedClaims`] — the identity a verified
//!   token resolves to.
//! - [`Credential`], [`PasswordDigest`] — stored password material.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `gatehouse-*` crates.
//! - No network or disk access. The only ambient input is the process
//!   environment, read by [`Settings::from_env`].
//! - No `.unwrap()` outside tests.

pub mod admission;
pub mod credential;
pub mod error;
pub mod identity;
pub mod secret;
pub mod settings;

pub use admission::AdmissionGuard;
pub use credential::{
    check_password_policy, normalize_identifier, Credential, PasswordDigest, PASSWORD_MAX_LEN,
    PASSWORD_MIN_LEN,
};
pub use error::{AdmissionError, ConfigProblem, ConfigurationError};
pub use identity::{GrantedClaims, Principal, Role};
pub use secret::SecretKey;
pub use settings::{
    DatabaseSettings, Environment, HashCost, RateLimitSettings, ServerSettings, Settings,
    SuperuserSeed,
};
