//! # Bearer Tokens
//!
//! Compact JWS tokens signed with HMAC-SHA-256 (`HS256`) under the
//! process-wide [`SecretKey`].
//!
//! ## Wire Format
//!
//! ```text
//! base64url(header) "." base64url(claims) "." base64url(hmac)
//! ```
//!
//! All segments use unpadded base64url. The header is always
//! `{"alg":"HS256","typ":"JWT"}`.
//!
//! ## Security Invariants
//!
//! - The algorithm is fixed. The header's `alg` is checked against
//!   [`TOKEN_ALGORITHM`] and never used to pick a verifier, so `none`,
//!   `HS512`, and public-key algorithms are all rejected.
//! - The signature is checked (in constant time) before any claim is
//!   trusted.
//! - Time checks use the caller's `now` and an explicit leeway; there is
//!   no hidden clock read, and verification performs no I/O.
//! - Access and refresh tokens carry a `token_use` claim and are not
//!   interchangeable.

use std::collections::BTreeSet;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use gatehouse_core::{GrantedClaims, Principal, Role, SecretKey, Settings};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::error::TokenError;

type HmacSha256 = Hmac<Sha256>;

/// The only accepted signing algorithm.
pub const TOKEN_ALGORITHM: &str = "HS256";

/// Which endpoint family a token is good for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenUse {
    Access,
    Refresh,
}

/// Lifetimes applied at issuance and the leeway applied at verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLifetimes {
    pub access: Duration,
    pub refresh: Duration,
    pub leeway: Duration,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access: Duration::minutes(30),
            refresh: Duration::days(7),
            leeway: Duration::zero(),
        }
    }
}

/// Verified contents of a refresh token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshGrant {
    pub subject: String,
    pub token_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    typ: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: i64,
    exp: i64,
    jti: Uuid,
    token_use: TokenUse,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<Role>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    scopes: BTreeSet<String>,
}

/// Issues and verifies bearer tokens under one secret key.
#[derive(Clone)]
pub struct TokenIssuer {
    key: SecretKey,
    lifetimes: TokenLifetimes,
    header_segment: String,
}

impl TokenIssuer {
    pub fn new(key: &SecretKey, lifetimes: TokenLifetimes) -> Self {
        let header = serde_json::json!({ "alg": TOKEN_ALGORITHM, "typ": "JWT" });
        Self {
            key: key.clone(),
            lifetimes,
            header_segment: URL_SAFE_NO_PAD.encode(header.to_string()),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            &settings.secret_key,
            TokenLifetimes {
                access: settings.access_token_lifetime,
                refresh: settings.refresh_token_lifetime,
                leeway: settings.token_leeway,
            },
        )
    }

    pub fn lifetimes(&self) -> TokenLifetimes {
        self.lifetimes
    }

    /// Issue an access token for `subject` valid from `now` for the
    /// configured access lifetime.
    pub fn issue(
        &self,
        subject: &str,
        claims: &GrantedClaims,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let exp = expiry(subject, now, self.lifetimes.access)?;
        self.sign(&Claims {
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp,
            jti: Uuid::new_v4(),
            token_use: TokenUse::Access,
            role: Some(claims.role),
            scopes: claims.scopes.clone(),
        })
    }

    /// Issue a refresh token. Refresh tokens carry no role; the gate looks
    /// the account up again when one is redeemed.
    pub fn issue_refresh(&self, subject: &str, now: DateTime<Utc>) -> Result<String, TokenError> {
        let exp = expiry(subject, now, self.lifetimes.refresh)?;
        self.sign(&Claims {
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp,
            jti: Uuid::new_v4(),
            token_use: TokenUse::Refresh,
            role: None,
            scopes: BTreeSet::new(),
        })
    }

    /// Verify an access token and resolve its principal.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Principal, TokenError> {
        let claims = self.decode(token, TokenUse::Access, now)?;
        let (issued_at, expires_at) = timestamps(&claims)?;
        Ok(Principal {
            subject: claims.sub,
            role: claims.role.unwrap_or_default(),
            scopes: claims.scopes,
            token_id: claims.jti,
            issued_at,
            expires_at,
        })
    }

    /// Verify a refresh token. Does not consult any revocation state.
    pub fn verify_refresh(&self, token: &str, now: DateTime<Utc>) -> Result<RefreshGrant, TokenError> {
        let claims = self.decode(token, TokenUse::Refresh, now)?;
        let (issued_at, expires_at) = timestamps(&claims)?;
        Ok(RefreshGrant {
            subject: claims.sub,
            token_id: claims.jti,
            issued_at,
            expires_at,
        })
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(self.key.expose())
            .map_err(|e| TokenError::Issuance(e.to_string()))
    }

    fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        let payload =
            serde_json::to_vec(claims).map_err(|e| TokenError::Issuance(e.to_string()))?;
        let signing_input = format!("{}.{}", self.header_segment, URL_SAFE_NO_PAD.encode(payload));

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();

        Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature)))
    }

    fn decode(&self, token: &str, expected: TokenUse, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        // Structure.
        let mut parts = token.split('.');
        let (Some(header_b64), Some(claims_b64), Some(sig_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::invalid("expected three segments"));
        };
        if header_b64.is_empty() || claims_b64.is_empty() || sig_b64.is_empty() {
            return Err(TokenError::invalid("empty segment"));
        }

        // Header.
        let header_bytes = URL_SAFE_NO_PAD
            .decode(header_b64)
            .map_err(|_| TokenError::invalid("header is not base64url"))?;
        let header: Header = serde_json::from_slice(&header_bytes)
            .map_err(|_| TokenError::invalid("header is not valid JSON"))?;
        if header.alg != TOKEN_ALGORITHM {
            return Err(TokenError::invalid(format!(
                "unsupported algorithm '{}'",
                header.alg
            )));
        }

        // Signature, before anything in the claims is read.
        let signature = URL_SAFE_NO_PAD
            .decode(sig_b64)
            .map_err(|_| TokenError::invalid("signature is not base64url"))?;
        let mut mac = self.mac()?;
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(claims_b64.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::invalid("signature mismatch"))?;

        // Claims.
        let claims_bytes = URL_SAFE_NO_PAD
            .decode(claims_b64)
            .map_err(|_| TokenError::invalid("claims are not base64url"))?;
        let claims: Claims = serde_json::from_slice(&claims_bytes)
            .map_err(|e| TokenError::invalid(format!("missing or malformed claims: {e}")))?;
        if claims.sub.trim().is_empty() {
            return Err(TokenError::invalid("empty subject"));
        }

        // Kind.
        if claims.token_use != expected {
            return Err(TokenError::invalid(format!(
                "expected {expected:?} token, got {:?}",
                claims.token_use
            )));
        }

        // Time.
        let now = now.timestamp();
        let leeway = self.lifetimes.leeway.num_seconds();
        if claims.exp <= claims.iat {
            return Err(TokenError::invalid("expiry is not after issue time"));
        }
        if claims.iat > now.saturating_add(leeway) {
            return Err(TokenError::invalid("issued in the future"));
        }
        if now > claims.exp.saturating_add(leeway) {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}

/// Expiry timestamp for a token issued to `subject` at `now`. Refuses
/// anything `decode` would reject, so an issued token always verifies.
fn expiry(subject: &str, now: DateTime<Utc>, lifetime: Duration) -> Result<i64, TokenError> {
    if subject.trim().is_empty() {
        return Err(TokenError::Issuance("subject must not be blank".into()));
    }
    now.checked_add_signed(lifetime)
        .map(|exp| exp.timestamp())
        .ok_or_else(|| TokenError::Issuance("expiry is out of range".into()))
}

fn timestamps(claims: &Claims) -> Result<(DateTime<Utc>, DateTime<Utc>), TokenError> {
    let issued_at = DateTime::from_timestamp(claims.iat, 0)
        .ok_or_else(|| TokenError::invalid("iat out of range"))?;
    let expires_at = DateTime::from_timestamp(claims.exp, 0)
        .ok_or_else(|| TokenError::invalid("exp out of range"))?;
    Ok((issued_at, expires_at))
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("key", &self.key)
            .field("lifetimes", &self.lifetimes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn key() -> SecretKey {
        SecretKey::new(b"0123456789abcdef0123456789abcdef".to_vec())
    }

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(&key(), TokenLifetimes::default())
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    /// Build a token with arbitrary header and claims, signed with `key`.
    fn forge(header: &serde_json::Value, claims: &serde_json::Value, key: &[u8]) -> String {
        let input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(claims.to_string())
        );
        let mut mac = HmacSha256::new_from_slice(key).unwrap();
        mac.update(input.as_bytes());
        format!("{input}.{}", URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
    }

    fn valid_claims() -> serde_json::Value {
        serde_json::json!({
            "sub": "user-1",
            "iat": now().timestamp(),
            "exp": now().timestamp() + 600,
            "jti": Uuid::new_v4(),
            "token_use": "access",
        })
    }

    #[test]
    fn issued_token_verifies() {
        let iss = issuer();
        let claims = GrantedClaims::with_role(Role::Superuser);
        let token = iss.issue("user-1", &claims, now()).unwrap();
        let principal = iss.verify(&token, now()).unwrap();
        assert_eq!(principal.subject, "user-1");
        assert_eq!(principal.role, Role::Superuser);
        assert_eq!(principal.issued_at, now());
        assert_eq!(principal.expires_at, now() + Duration::minutes(30));
    }

    #[test]
    fn scopes_survive_round_trip() {
        let iss = issuer();
        let mut claims = GrantedClaims::default();
        claims.scopes.insert("items:read".into());
        let token = iss.issue("user-1", &claims, now()).unwrap();
        assert!(iss.verify(&token, now()).unwrap().has_scope("items:read"));
    }

    #[test]
    fn token_has_three_unpadded_segments() {
        let token = issuer().issue("u", &GrantedClaims::default(), now()).unwrap();
        assert_eq!(token.split('.').count(), 3);
        assert!(!token.contains('='));
        let header = URL_SAFE_NO_PAD.decode(token.split('.').next().unwrap()).unwrap();
        let header: serde_json::Value = serde_json::from_slice(&header).unwrap();
        assert_eq!(header["alg"], "HS256");
    }

    #[test]
    fn expired_one_second_after_lifetime() {
        let iss = issuer();
        let token = iss.issue("u", &GrantedClaims::default(), now()).unwrap();
        let at_expiry = now() + Duration::minutes(30);
        assert!(iss.verify(&token, at_expiry).is_ok());
        assert_eq!(
            iss.verify(&token, at_expiry + Duration::seconds(1)),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn leeway_extends_acceptance() {
        let lifetimes = TokenLifetimes {
            leeway: Duration::seconds(30),
            ..TokenLifetimes::default()
        };
        let iss = TokenIssuer::new(&key(), lifetimes);
        let token = iss.issue("u", &GrantedClaims::default(), now()).unwrap();
        let late = now() + Duration::minutes(30) + Duration::seconds(30);
        assert!(iss.verify(&token, late).is_ok());
        assert_eq!(
            iss.verify(&token, late + Duration::seconds(1)),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn future_issued_token_is_invalid() {
        let iss = issuer();
        let token = iss
            .issue("u", &GrantedClaims::default(), now() + Duration::minutes(5))
            .unwrap();
        assert!(matches!(iss.verify(&token, now()), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn foreign_key_is_invalid() {
        let token = issuer().issue("u", &GrantedClaims::default(), now()).unwrap();
        let other = TokenIssuer::new(&SecretKey::new(b"another-key".to_vec()), TokenLifetimes::default());
        assert!(matches!(other.verify(&token, now()), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn tampered_claims_are_invalid() {
        let iss = issuer();
        let token = iss.issue("u", &GrantedClaims::default(), now()).unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        let mut claims: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(parts[1]).unwrap()).unwrap();
        claims["role"] = "superuser".into();
        let tampered = format!(
            "{}.{}.{}",
            parts[0],
            URL_SAFE_NO_PAD.encode(claims.to_string()),
            parts[2]
        );
        assert!(matches!(iss.verify(&tampered, now()), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn alg_none_is_rejected() {
        let header = serde_json::json!({"alg": "none", "typ": "JWT"});
        let unsigned = format!(
            "{}.{}.",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(valid_claims().to_string())
        );
        assert!(matches!(issuer().verify(&unsigned, now()), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn other_algorithms_are_rejected_even_when_signed() {
        for alg in ["HS512", "RS256", "hs256", "ES256"] {
            let token = forge(
                &serde_json::json!({"alg": alg, "typ": "JWT"}),
                &valid_claims(),
                key().expose(),
            );
            assert!(
                matches!(issuer().verify(&token, now()), Err(TokenError::Invalid(_))),
                "{alg} accepted"
            );
        }
    }

    #[test]
    fn correctly_signed_forgery_with_right_header_verifies() {
        let token = forge(
            &serde_json::json!({"alg": "HS256"}),
            &valid_claims(),
            key().expose(),
        );
        assert_eq!(issuer().verify(&token, now()).unwrap().subject, "user-1");
    }

    #[test]
    fn missing_required_claims_are_invalid() {
        for field in ["sub", "iat", "exp", "jti", "token_use"] {
            let mut claims = valid_claims();
            claims.as_object_mut().unwrap().remove(field);
            let token = forge(&serde_json::json!({"alg": "HS256"}), &claims, key().expose());
            assert!(
                matches!(issuer().verify(&token, now()), Err(TokenError::Invalid(_))),
                "missing {field} accepted"
            );
        }
    }

    #[test]
    fn blank_subject_is_not_issued() {
        let iss = issuer();
        for subject in ["", "   "] {
            assert!(matches!(
                iss.issue(subject, &GrantedClaims::default(), now()),
                Err(TokenError::Issuance(_))
            ));
            assert!(matches!(
                iss.issue_refresh(subject, now()),
                Err(TokenError::Issuance(_))
            ));
        }
    }

    #[test]
    fn expiry_past_calendar_range_is_an_error() {
        let iss = issuer();
        let edge = DateTime::<Utc>::MAX_UTC - chrono::Duration::minutes(1);
        assert!(matches!(
            iss.issue("u", &GrantedClaims::default(), edge),
            Err(TokenError::Issuance(_))
        ));
        assert!(matches!(iss.issue_refresh("u", edge), Err(TokenError::Issuance(_))));
    }

    #[test]
    fn empty_subject_is_invalid() {
        let mut claims = valid_claims();
        claims["sub"] = "".into();
        let token = forge(&serde_json::json!({"alg": "HS256"}), &claims, key().expose());
        assert!(matches!(issuer().verify(&token, now()), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn expiry_before_issue_is_invalid() {
        let mut claims = valid_claims();
        claims["exp"] = (now().timestamp() - 1).into();
        let token = forge(&serde_json::json!({"alg": "HS256"}), &claims, key().expose());
        assert!(matches!(issuer().verify(&token, now()), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn malformed_structures_are_invalid() {
        let iss = issuer();
        for bad in ["", "abc", "a.b", "a.b.c.d", "..", "a..c", "!!!.@@@.###"] {
            assert!(
                matches!(iss.verify(bad, now()), Err(TokenError::Invalid(_))),
                "{bad:?} accepted"
            );
        }
    }

    #[test]
    fn refresh_and_access_are_not_interchangeable() {
        let iss = issuer();
        let access = iss.issue("u", &GrantedClaims::default(), now()).unwrap();
        let refresh = iss.issue_refresh("u", now()).unwrap();
        assert!(matches!(iss.verify(&refresh, now()), Err(TokenError::Invalid(_))));
        assert!(matches!(iss.verify_refresh(&access, now()), Err(TokenError::Invalid(_))));

        let grant = iss.verify_refresh(&refresh, now()).unwrap();
        assert_eq!(grant.subject, "u");
        assert_eq!(grant.expires_at, now() + Duration::days(7));
    }

    #[test]
    fn every_token_gets_a_fresh_id() {
        let iss = issuer();
        let a = iss.verify(&iss.issue("u", &GrantedClaims::default(), now()).unwrap(), now()).unwrap();
        let b = iss.verify(&iss.issue("u", &GrantedClaims::default(), now()).unwrap(), now()).unwrap();
        assert_ne!(a.token_id, b.token_id);
    }

    #[test]
    fn debug_does_not_leak_key() {
        let rendered = format!("{:?}", issuer());
        assert!(!rendered.contains("0123456789abcdef"));
    }
}
