//! # Stored Credentials
//!
//! A [`Credential`] pairs a login identifier with a [`PasswordDigest`].
//! Plaintext passwords never appear in these types.

use serde::{Deserialize, Serialize};

/// Shortest accepted password, in characters.
pub const PASSWORD_MIN_LEN: usize = 8;
/// Longest accepted password, in characters.
pub const PASSWORD_MAX_LEN: usize = 64;

/// A one-way password digest in PHC string format
/// (`$argon2id$v=19$m=...,t=...,p=...$salt$hash`).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PasswordDigest(String);

impl PasswordDigest {
    pub fn new(phc: impl Into<String>) -> Self {
        Self(phc.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for PasswordDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The algorithm prefix is useful in logs; the salt and hash are not.
        let prefix = self.0.split('$').nth(1).unwrap_or("unknown");
        write!(f, "PasswordDigest({prefix}, ..)")
    }
}

/// Login identifier paired with its password digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub identifier: String,
    pub digest: PasswordDigest,
}

/// Canonical form of a login identifier: trimmed and lowercased.
///
/// Applied on registration and on every lookup so that `Alice@Example.com`
/// and `alice@example.com ` name the same account.
pub fn normalize_identifier(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Check a candidate password against the length policy.
pub fn check_password_policy(password: &str) -> Result<(), String> {
    let len = password.chars().count();
    if len < PASSWORD_MIN_LEN {
        return Err(format!(
            "password must be at least {PASSWORD_MIN_LEN} characters"
        ));
    }
    if len > PASSWORD_MAX_LEN {
        return Err(format!(
            "password must be at most {PASSWORD_MAX_LEN} characters"
        ));
    }
    Ok(())
}
