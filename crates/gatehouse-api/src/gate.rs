//! # Auth Gate
//!
//! Composes the credential hasher, the token issuer, and the user store
//! into the login → token → authorize flow, plus the account operations
//! built on the same pieces (refresh, logout, registration, password
//! change).
//!
//! ## Security Invariants
//!
//! - Every login failure (unknown identifier, no password set, inactive
//!   account, wrong password) returns [`AuthError::AuthenticationFailed`].
//!   Unknown identifiers still pay for one Argon2 verification so timing
//!   does not reveal which accounts exist.
//! - Hashing and verification run on tokio's blocking pool.
//! - [`AuthGate::authorize`] is pure token verification. It surfaces
//!   [`TokenError`] kinds unchanged and never touches the store.
//! - Refresh tokens are single-use: redeeming one revokes it.
//!
//! There are no sessions. Each call stands alone.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use gatehouse_core::{
    check_password_policy, normalize_identifier, GrantedClaims, PasswordDigest, Principal,
    Settings, SuperuserSeed,
};
use gatehouse_crypto::{CredentialHasher, HashError, TokenError, TokenIssuer};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::store::{RevocationList, StoreError, UserRecord, UserStore};

/// Errors surfaced by the gate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Login failed. Deliberately says nothing about why.
    #[error("incorrect username or password")]
    AuthenticationFailed,

    /// Token verification failed; the kind is passed through untouched.
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("identifier already registered")]
    IdentifierTaken,

    /// A password or identifier broke the account policy.
    #[error("{0}")]
    Policy(String),

    #[error("user not found")]
    UnknownUser,

    /// A valid token names an account that has since been deactivated.
    #[error("account is inactive")]
    InactiveAccount,

    /// Store or hashing failure. Logged, never shown to clients.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate => Self::IdentifierTaken,
            StoreError::NotFound => Self::UnknownUser,
            StoreError::Unavailable(msg) => Self::Internal(msg),
        }
    }
}

impl From<HashError> for AuthError {
    fn from(err: HashError) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Access and refresh tokens returned by login and refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access-token lifetime in seconds.
    pub expires_in: i64,
}

/// Registration input.
#[derive(Clone)]
pub struct NewUser {
    pub identifier: String,
    pub password: Zeroizing<String>,
    pub full_name: Option<String>,
    pub is_superuser: bool,
}

impl std::fmt::Debug for NewUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewUser")
            .field("identifier", &self.identifier)
            .field("password", &"[REDACTED]")
            .field("full_name", &self.full_name)
            .field("is_superuser", &self.is_superuser)
            .finish()
    }
}

/// Authentication gate shared by every request handler.
pub struct AuthGate {
    hasher: Arc<CredentialHasher>,
    issuer: TokenIssuer,
    store: Arc<dyn UserStore>,
    revoked: RevocationList,
}

impl AuthGate {
    pub fn new(settings: &Settings, store: Arc<dyn UserStore>) -> Result<Self, HashError> {
        Ok(Self {
            hasher: Arc::new(CredentialHasher::new(settings.hash_cost)?),
            issuer: TokenIssuer::from_settings(settings),
            store,
            revoked: RevocationList::new(),
        })
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// Check credentials and issue a token pair.
    pub async fn login(
        &self,
        identifier: &str,
        plaintext: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, AuthError> {
        let identifier = normalize_identifier(identifier);
        let user = self.store.find_by_identifier(&identifier).await?;

        let digest = user.as_ref().and_then(|u| u.digest.clone());
        let password = Zeroizing::new(plaintext.to_string());
        let hasher = Arc::clone(&self.hasher);
        let (verified, stale) = tokio::task::spawn_blocking(move || match digest {
            Some(digest) => {
                let ok = hasher.verify(&password, &digest);
                (ok, ok && hasher.needs_rehash(&digest))
            }
            None => {
                hasher.verify_dummy(&password);
                (false, false)
            }
        })
        .await
        .map_err(|e| AuthError::Internal(format!("verification task failed: {e}")))?;

        let user = match user {
            Some(user) if verified && user.is_active => user,
            _ => {
                tracing::warn!("login rejected");
                return Err(AuthError::AuthenticationFailed);
            }
        };

        if stale {
            self.upgrade_digest(&user, plaintext).await;
        }

        tracing::info!(user_id = %user.id, "login succeeded");
        self.issue_pair(&user, now)
    }

    /// Verify an access token and resolve its principal.
    pub fn authorize(&self, token: &str, now: DateTime<Utc>) -> Result<Principal, AuthError> {
        self.issuer.verify(token, now).map_err(AuthError::Token)
    }

    /// Redeem a refresh token for a new pair. The presented token is revoked.
    pub async fn refresh(&self, refresh_token: &str, now: DateTime<Utc>) -> Result<TokenPair, AuthError> {
        let grant = self.issuer.verify_refresh(refresh_token, now)?;
        if self.revoked.is_revoked(grant.token_id) {
            tracing::warn!(token_id = %grant.token_id, "revoked refresh token presented");
            return Err(TokenError::Invalid("refresh token revoked".into()).into());
        }

        let user = match self.load_subject(&grant.subject).await? {
            Some(user) if user.is_active => user,
            _ => return Err(TokenError::Invalid("subject is no longer active".into()).into()),
        };

        // Lost race with a concurrent redemption of the same token.
        if !self.revoked.revoke(grant.token_id, grant.expires_at) {
            return Err(TokenError::Invalid("refresh token revoked".into()).into());
        }
        self.revoked.purge_expired(now);

        self.issue_pair(&user, now)
    }

    /// Revoke a refresh token. Revoking an already-revoked token succeeds.
    pub fn logout(&self, refresh_token: &str, now: DateTime<Utc>) -> Result<(), AuthError> {
        let grant = self.issuer.verify_refresh(refresh_token, now)?;
        self.revoked.revoke(grant.token_id, grant.expires_at);
        self.revoked.purge_expired(now);
        tracing::info!(subject = %grant.subject, "refresh token revoked");
        Ok(())
    }

    /// Create an account.
    pub async fn register(&self, new_user: NewUser) -> Result<UserRecord, AuthError> {
        let identifier = normalize_identifier(&new_user.identifier);
        if identifier.is_empty() {
            return Err(AuthError::Policy("username must not be empty".into()));
        }
        check_password_policy(&new_user.password).map_err(AuthError::Policy)?;

        if self.store.find_by_identifier(&identifier).await?.is_some() {
            return Err(AuthError::IdentifierTaken);
        }

        let digest = self.hash(new_user.password).await?;
        let user = UserRecord {
            id: Uuid::new_v4(),
            identifier,
            full_name: new_user.full_name.filter(|n| !n.trim().is_empty()),
            digest: Some(digest),
            is_active: true,
            is_superuser: new_user.is_superuser,
            created_at: Utc::now(),
        };
        self.store.insert(user.clone()).await?;
        tracing::info!(user_id = %user.id, superuser = user.is_superuser, "account registered");
        Ok(user)
    }

    /// Replace a password after re-proving the current one.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        check_password_policy(new_password).map_err(AuthError::Policy)?;
        if current == new_password {
            return Err(AuthError::Policy(
                "new password must differ from the current one".into(),
            ));
        }

        let user = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UnknownUser)?;
        let Some(digest) = user.digest.clone() else {
            return Err(AuthError::AuthenticationFailed);
        };

        let password = Zeroizing::new(current.to_string());
        let hasher = Arc::clone(&self.hasher);
        let verified = tokio::task::spawn_blocking(move || hasher.verify(&password, &digest))
            .await
            .map_err(|e| AuthError::Internal(format!("verification task failed: {e}")))?;
        if !verified {
            return Err(AuthError::AuthenticationFailed);
        }

        let digest = self.hash(Zeroizing::new(new_password.to_string())).await?;
        self.store.update_digest(user.id, digest).await?;
        tracing::info!(user_id = %user.id, "password changed");
        Ok(())
    }

    /// Create the configured first superuser if no account holds that
    /// identifier yet. Returns whether an account was created.
    pub async fn ensure_superuser(&self, seed: &SuperuserSeed) -> Result<bool, AuthError> {
        if self.store.find_by_identifier(&seed.identifier).await?.is_some() {
            return Ok(false);
        }
        let created = self
            .register(NewUser {
                identifier: seed.identifier.clone(),
                password: seed.password.clone(),
                full_name: None,
                is_superuser: true,
            })
            .await;
        match created {
            Ok(_) => Ok(true),
            // Another instance seeded it first.
            Err(AuthError::IdentifierTaken) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn user(&self, id: Uuid) -> Result<UserRecord, AuthError> {
        self.store.find_by_id(id).await?.ok_or(AuthError::UnknownUser)
    }

    /// Look up the account a principal names.
    pub async fn principal_user(&self, principal: &Principal) -> Result<UserRecord, AuthError> {
        match self.load_subject(&principal.subject).await? {
            Some(user) if user.is_active => Ok(user),
            Some(_) => Err(AuthError::InactiveAccount),
            None => Err(AuthError::UnknownUser),
        }
    }

    async fn load_subject(&self, subject: &str) -> Result<Option<UserRecord>, AuthError> {
        let id: Uuid = subject
            .parse()
            .map_err(|_| TokenError::Invalid("subject is not an account id".into()))?;
        Ok(self.store.find_by_id(id).await?)
    }

    fn issue_pair(&self, user: &UserRecord, now: DateTime<Utc>) -> Result<TokenPair, AuthError> {
        let subject = user.id.to_string();
        let access_token = self
            .issuer
            .issue(&subject, &GrantedClaims::with_role(user.role()), now)?;
        let refresh_token = self.issuer.issue_refresh(&subject, now)?;
        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "bearer".into(),
            expires_in: self.issuer.lifetimes().access.num_seconds(),
        })
    }

    async fn hash(&self, password: Zeroizing<String>) -> Result<PasswordDigest, AuthError> {
        let hasher = Arc::clone(&self.hasher);
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AuthError::Internal(format!("hashing task failed: {e}")))?
            .map_err(AuthError::from)
    }

    /// Re-hash under the current cost. Failure leaves the old digest in
    /// place; it still verifies.
    async fn upgrade_digest(&self, user: &UserRecord, plaintext: &str) {
        let upgraded = match self.hash(Zeroizing::new(plaintext.to_string())).await {
            Ok(digest) => self.store.update_digest(user.id, digest).await.map_err(AuthError::from),
            Err(e) => Err(e),
        };
        match upgraded {
            Ok(()) => tracing::info!(user_id = %user.id, "password digest upgraded to current cost"),
            Err(e) => tracing::warn!(user_id = %user.id, error = %e, "password digest upgrade failed"),
        }
    }
}

impl std::fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGate")
            .field("hasher", &self.hasher)
            .field("issuer", &self.issuer)
            .field("revoked", &self.revoked.len())
            .finish()
    }
}
