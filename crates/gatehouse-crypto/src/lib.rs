//! # gatehouse-crypto — Credential and Token Cryptography
//!
//! - **Argon2id** password hashing with a cost fixed by configuration
//!   ([`CredentialHasher`]).
//! - **HS256** compact JWS bearer tokens, access and refresh kinds
//!   ([`TokenIssuer`]).
//!
//! Everything here is pure computation over in-memory values. Hashing is
//! deliberately slow; async callers run it on a blocking pool.

pub mod error;
pub mod password;
pub mod token;

pub use error::{HashError, TokenError};
pub use password::CredentialHasher;
pub use token::{RefreshGrant, TokenIssuer, TokenLifetimes, TokenUse, TOKEN_ALGORITHM};
