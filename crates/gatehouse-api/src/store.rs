//! # User Store
//!
//! The data-access seam. [`UserStore`] is what the gate calls to look up
//! and persist accounts; a database-backed implementation lives outside
//! this workspace. [`InMemoryUserStore`] backs tests and single-process
//! deployments.
//!
//! Also holds the refresh-token [`RevocationList`].
//!
//! Locks are `parking_lot` and are never held across `.await`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use gatehouse_core::{Credential, PasswordDigest, Role};
use parking_lot::RwLock;
use thiserror::Error;
use uuid::Uuid;

/// Stored account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: Uuid,
    /// Normalized login identifier.
    pub identifier: String,
    pub full_name: Option<String>,
    /// Absent for accounts that cannot log in with a password.
    pub digest: Option<PasswordDigest>,
    pub is_active: bool,
    pub is_superuser: bool,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn role(&self) -> Role {
        if self.is_superuser {
            Role::Superuser
        } else {
            Role::User
        }
    }

    pub fn credential(&self) -> Option<Credential> {
        self.digest.clone().map(|digest| Credential {
            identifier: self.identifier.clone(),
            digest,
        })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("identifier already registered")]
    Duplicate,

    #[error("user not found")]
    NotFound,

    /// Backend failure. The message is for logs only.
    #[error("user store unavailable: {0}")]
    Unavailable(String),
}

/// Account persistence used by the auth gate.
///
/// Implementations enforce their own consistency; in particular `insert`
/// must reject a second account with the same identifier.
#[axum::async_trait]
pub trait UserStore: Send + Sync + 'static {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<UserRecord>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError>;

    async fn insert(&self, user: UserRecord) -> Result<(), StoreError>;

    /// Replace an account's password digest.
    async fn update_digest(&self, id: Uuid, digest: PasswordDigest) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
struct Users {
    by_id: HashMap<Uuid, UserRecord>,
    by_identifier: HashMap<String, Uuid>,
}

/// Process-local [`UserStore`].
#[derive(Debug, Default, Clone)]
pub struct InMemoryUserStore {
    users: Arc<RwLock<Users>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flip the active flag. Used by operators (and tests) to lock an account.
    pub fn set_active(&self, id: Uuid, active: bool) -> Result<(), StoreError> {
        let mut users = self.users.write();
        let user = users.by_id.get_mut(&id).ok_or(StoreError::NotFound)?;
        user.is_active = active;
        Ok(())
    }
}

#[axum::async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<UserRecord>, StoreError> {
        let users = self.users.read();
        Ok(users
            .by_identifier
            .get(identifier)
            .and_then(|id| users.by_id.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.users.read().by_id.get(&id).cloned())
    }

    async fn insert(&self, user: UserRecord) -> Result<(), StoreError> {
        let mut users = self.users.write();
        if users.by_identifier.contains_key(&user.identifier) || users.by_id.contains_key(&user.id)
        {
            return Err(StoreError::Duplicate);
        }
        users.by_identifier.insert(user.identifier.clone(), user.id);
        users.by_id.insert(user.id, user);
        Ok(())
    }

    async fn update_digest(&self, id: Uuid, digest: PasswordDigest) -> Result<(), StoreError> {
        let mut users = self.users.write();
        let user = users.by_id.get_mut(&id).ok_or(StoreError::NotFound)?;
        user.digest = Some(digest);
        Ok(())
    }
}

/// Revoked refresh-token ids, each kept until the token would have expired
/// anyway.
#[derive(Debug, Default)]
pub struct RevocationList {
    revoked: RwLock<HashMap<Uuid, DateTime<Utc>>>,
}

impl RevocationList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Revoke a token id. Returns `false` if it was already revoked, which
    /// lets a caller detect a concurrent second use of the same token.
    pub fn revoke(&self, token_id: Uuid, expires_at: DateTime<Utc>) -> bool {
        self.revoked.write().insert(token_id, expires_at).is_none()
    }

    pub fn is_revoked(&self, token_id: Uuid) -> bool {
        self.revoked.read().contains_key(&token_id)
    }

    /// Drop entries whose tokens have expired and no longer need tracking.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut revoked = self.revoked.write();
        let before = revoked.len();
        revoked.retain(|_, expires_at| *expires_at >= now);
        before - revoked.len()
    }

    pub fn len(&self) -> usize {
        self.revoked.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
