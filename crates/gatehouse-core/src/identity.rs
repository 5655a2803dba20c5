//! # Principal Identity
//!
//! The identity a verified access token resolves to. A [`Principal`] is
//! built per request and dropped with it; nothing here is persisted.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Roles, ordered by privilege level.
///
/// The `Ord` derivation follows declaration order (`User < Superuser`), so
/// `>=` answers "has at least this role".
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Regular account. Can manage its own profile.
    #[default]
    User,
    /// Moderator account. Can read any account.
    Superuser,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Superuser => "superuser",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional claims embedded alongside the subject in an access token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantedClaims {
    #[serde(default)]
    pub role: Role,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub scopes: BTreeSet<String>,
}

impl GrantedClaims {
    pub fn with_role(role: Role) -> Self {
        Self {
            role,
            scopes: BTreeSet::new(),
        }
    }
}

/// Authenticated identity resolved from a verified access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Subject identity the token was issued to.
    pub subject: String,
    pub role: Role,
    pub scopes: BTreeSet<String>,
    /// The token's `jti`.
    pub token_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Principal {
    /// Whether the principal holds at least `minimum`.
    pub fn has_role(&self, minimum: Role) -> bool {
        self.role >= minimum
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }
}
