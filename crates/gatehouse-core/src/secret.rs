//! # Secret Key Material
//!
//! The process-wide signing secret. Opaque bytes; the only way to read
//! them is [`SecretKey::expose`], which the token module calls when it
//! keys its MAC.
//!
//! ## Security Invariants
//!
//! - `Debug` never prints the bytes.
//! - The buffer is zeroized on drop.
//! - Equality is constant-time.

use rand_core::{OsRng, RngCore};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length in bytes of keys produced by [`SecretKey::generate`].
pub const GENERATED_KEY_LEN: usize = 32;

/// Signing secret shared by token issuance and verification.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey(Vec<u8>);

impl SecretKey {
    /// Wrap existing key bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Generate a random key from the OS CSPRNG.
    ///
    /// Used for the ephemeral key in test mode; such a key does not survive
    /// a restart, so every token it signed becomes invalid.
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; GENERATED_KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Borrow the raw key bytes.
    pub fn expose(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKey([REDACTED])")
    }
}

impl PartialEq for SecretKey {
    fn eq(&self, other: &Self) -> bool {
        if self.0.len() != other.0.len() {
            // Keep the timing of the mismatch path close to the match path.
            let _ = self.0.ct_eq(&self.0);
            return false;
        }
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for SecretKey {}
