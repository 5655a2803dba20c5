//! # Cryptographic Error Types

use thiserror::Error;

/// Errors from credential hashing.
///
/// Verification never produces one of these: a digest that cannot be
/// checked simply fails to verify.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HashError {
    /// The configured Argon2 cost is outside what the algorithm accepts.
    #[error("invalid hash cost: {0}")]
    InvalidCost(String),

    /// Argon2 failed while deriving the digest.
    #[error("password hashing failed: {0}")]
    Hashing(String),
}

/// Errors from bearer token handling.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// The token was valid but its expiry (plus leeway) has passed.
    #[error("token has expired")]
    Expired,

    /// Structure, header, signature, or claims are wrong. The reason is for
    /// logs only and is never sent to the client.
    #[error("invalid token: {0}")]
    Invalid(String),

    /// The claims could not be encoded while issuing.
    #[error("token could not be issued: {0}")]
    Issuance(String),
}

impl TokenError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid(reason.into())
    }
}
