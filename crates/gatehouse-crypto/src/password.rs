//! # Credential Hasher
//!
//! Argon2id password hashing. The work factor comes from [`HashCost`] in
//! settings and is never caller-supplied, so a request cannot ask for a
//! cheaper hash.
//!
//! ## Security Invariants
//!
//! - Every digest gets a fresh random salt from the OS CSPRNG.
//! - [`CredentialHasher::verify`] never errors. A malformed digest, or one
//!   produced by an algorithm other than Argon2id, fails verification.
//! - Digest comparison happens inside the `argon2` crate, which compares
//!   in constant time.
//! - Plaintext passwords are never logged.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use gatehouse_core::{HashCost, PasswordDigest};
use rand_core::OsRng;

use crate::error::HashError;

/// Input for the placeholder digest verified when a login names an
/// unknown account.
const DUMMY_PASSWORD: &str = "gatehouse-timing-equalizer";

/// Argon2id hasher bound to one configured cost.
pub struct CredentialHasher {
    params: Params,
    dummy: PasswordDigest,
}

impl CredentialHasher {
    /// Build a hasher for `cost`. Also derives the placeholder digest used
    /// by [`CredentialHasher::verify_dummy`], so construction costs one hash.
    pub fn new(cost: HashCost) -> Result<Self, HashError> {
        let params = Params::new(cost.memory_kib, cost.iterations, cost.parallelism, None)
            .map_err(|e| HashError::InvalidCost(e.to_string()))?;
        let mut hasher = Self {
            params,
            dummy: PasswordDigest::new(String::new()),
        };
        hasher.dummy = hasher.hash(DUMMY_PASSWORD)?;
        Ok(hasher)
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a plaintext password into a PHC-format digest.
    pub fn hash(&self, plaintext: &str) -> Result<PasswordDigest, HashError> {
        let salt = SaltString::generate(&mut OsRng);
        let phc = self
            .argon2()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| HashError::Hashing(e.to_string()))?;
        Ok(PasswordDigest::new(phc.to_string()))
    }

    /// Check a plaintext password against a stored digest.
    pub fn verify(&self, plaintext: &str, digest: &PasswordDigest) -> bool {
        let Ok(parsed) = PasswordHash::new(digest.as_str()) else {
            tracing::debug!("stored digest is not a valid PHC string");
            return false;
        };
        if parsed.algorithm != Algorithm::Argon2id.ident() {
            tracing::debug!(algorithm = %parsed.algorithm, "stored digest uses an unsupported algorithm");
            return false;
        }
        // The digest carries its own cost parameters; argon2 honours them.
        self.argon2()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    }

    /// Spend the same work as a real verification against a placeholder
    /// digest. Keeps unknown-account logins as slow as wrong-password ones.
    pub fn verify_dummy(&self, plaintext: &str) {
        let _ = self.verify(plaintext, &self.dummy);
    }

    /// Whether a stored digest was produced with a different algorithm,
    /// version, or cost than the one configured now.
    pub fn needs_rehash(&self, digest: &PasswordDigest) -> bool {
        let Ok(parsed) = PasswordHash::new(digest.as_str()) else {
            return true;
        };
        if parsed.algorithm != Algorithm::Argon2id.ident()
            || parsed.version != Some(Version::V0x13 as u32)
        {
            return true;
        }
        match Params::try_from(&parsed) {
            Ok(stored) => {
                stored.m_cost() != self.params.m_cost()
                    || stored.t_cost() != self.params.t_cost()
                    || stored.p_cost() != self.params.p_cost()
            }
            Err(_) => true,
        }
    }
}

impl std::fmt::Debug for CredentialHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialHasher")
            .field("m_cost", &self.params.m_cost())
            .field("t_cost", &self.params.t_cost())
            .field("p_cost", &self.params.p_cost())
            .finish()
    }
}
