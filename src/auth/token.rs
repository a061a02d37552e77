// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bearer token issuance and verification.
//!
//! Tokens are HS256 JWTs signed with a process-wide secret loaded at
//! startup. Expiry is an exact wall-clock comparison with no leeway:
//! a token is valid only while `exp > now`.

use std::collections::HashSet;
use std::time::Duration;

use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use super::claims::TokenClaims;
use super::error::AuthError;

/// Signing key problems. Only raised while building the codec at startup.
#[derive(Debug, thiserror::Error)]
pub enum TokenKeyError {
    #[error("token signing secret is not configured")]
    Missing,

    #[error("token signing secret is {len} bytes, at least {min} required")]
    TooShort { len: usize, min: usize },
}

/// Why a presented token was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,

    #[error("token signature is invalid")]
    BadSignature,

    #[error("token has expired")]
    Expired,
}

impl From<TokenError> for AuthError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Malformed | TokenError::BadSignature => AuthError::TokenMalformed,
            TokenError::Expired => AuthError::TokenExpired,
        }
    }
}

/// A freshly signed token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: i64,
}

/// Identity recovered from a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub username: String,
    pub principal_id: i64,
    pub expires_at: i64,
}

/// HS256 token codec.
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenCodec {
    /// Minimum secret length (256 bits).
    pub const MIN_SECRET_LEN: usize = 32;

    /// Build a codec from the shared secret.
    pub fn new(secret: &[u8]) -> Result<Self, TokenKeyError> {
        if secret.is_empty() {
            return Err(TokenKeyError::Missing);
        }
        if secret.len() < Self::MIN_SECRET_LEN {
            return Err(TokenKeyError::TooShort {
                len: secret.len(),
                min: Self::MIN_SECRET_LEN,
            });
        }

        // Expiry is checked by hand so the boundary is exclusive.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.required_spec_claims =
            HashSet::from(["exp".to_string(), "sub".to_string()]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        })
    }

    /// Issue a token for a principal, valid for `ttl` from now.
    pub fn issue(&self, principal_id: i64, username: &str, ttl: Duration) -> Result<IssuedToken, AuthError> {
        self.issue_at(principal_id, username, ttl, now_epoch_seconds())
    }

    /// Issue a token as of the given epoch second.
    pub fn issue_at(
        &self,
        principal_id: i64,
        username: &str,
        ttl: Duration,
        now: i64,
    ) -> Result<IssuedToken, AuthError> {
        let exp = i64::try_from(ttl.as_secs())
            .ok()
            .and_then(|secs| now.checked_add(secs))
            .ok_or_else(|| AuthError::Internal(format!("token TTL {ttl:?} overflows the expiry claim")))?;
        let claims = TokenClaims {
            sub: username.to_string(),
            pid: principal_id,
            iat: now,
            exp,
            jti: Uuid::new_v4().to_string(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("Failed to sign token: {e}")))?;

        Ok(IssuedToken {
            token,
            expires_at: claims.exp,
        })
    }

    /// Verify signature and expiry against the current time.
    pub fn verify(&self, token: &str) -> Result<VerifiedToken, TokenError> {
        self.verify_at(token, now_epoch_seconds())
    }

    /// Verify signature and expiry as of the given epoch second.
    pub fn verify_at(&self, token: &str, now: i64) -> Result<VerifiedToken, TokenError> {
        let data = decode::<TokenClaims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature => TokenError::BadSignature,
                _ => TokenError::Malformed,
            }
        })?;

        let claims = data.claims;
        if claims.exp <= now {
            return Err(TokenError::Expired);
        }

        Ok(VerifiedToken {
            username: claims.sub,
            principal_id: claims.pid,
            expires_at: claims.exp,
        })
    }
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

/// Current wall-clock time in epoch seconds.
pub fn now_epoch_seconds() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn codec() -> TokenCodec {
        TokenCodec::new(SECRET).unwrap()
    }

    #[test]
    fn issue_then_verify() {
        let codec = codec();
        let issued = codec.issue(42, "alice", Duration::from_secs(600)).unwrap();
        let verified = codec.verify(&issued.token).unwrap();

        assert_eq!(verified.username, "alice");
        assert_eq!(verified.principal_id, 42);
        assert_eq!(verified.expires_at, issued.expires_at);
    }

    #[test]
    fn oversized_ttl_is_an_error_not_a_wrap() {
        let codec = codec();
        assert!(matches!(
            codec.issue_at(1, "alice", Duration::from_secs(u64::MAX), 1_000),
            Err(AuthError::Internal(_))
        ));
        assert!(matches!(
            codec.issue_at(1, "alice", Duration::from_secs(10), i64::MAX - 5),
            Err(AuthError::Internal(_))
        ));
    }

    #[test]
    fn expiry_boundary_is_exclusive() {
        let codec = codec();
        let issued = codec.issue_at(1, "alice", Duration::from_secs(60), 1_000).unwrap();

        assert!(codec.verify_at(&issued.token, 1_059).is_ok());
        assert_eq!(codec.verify_at(&issued.token, 1_060), Err(TokenError::Expired));
        assert_eq!(codec.verify_at(&issued.token, 5_000), Err(TokenError::Expired));
    }

    #[test]
    fn foreign_signature_is_rejected() {
        let other = TokenCodec::new(b"ffffffffffffffffffffffffffffffff").unwrap();
        let issued = other.issue(1, "mallory", Duration::from_secs(600)).unwrap();

        assert_eq!(codec().verify(&issued.token), Err(TokenError::BadSignature));
    }

    #[test]
    fn garbage_is_malformed() {
        let codec = codec();
        assert_eq!(codec.verify("not-a-token"), Err(TokenError::Malformed));
        assert_eq!(codec.verify(""), Err(TokenError::Malformed));
        assert_eq!(codec.verify("a.b.c"), Err(TokenError::Malformed));
    }

    #[test]
    fn unsigned_token_is_not_accepted() {
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let claims = URL_SAFE_NO_PAD
            .encode(br#"{"sub":"alice","pid":1,"iat":1,"exp":9999999999,"jti":"x"}"#);
        let forged = format!("{header}.{claims}.");

        assert!(codec().verify(&forged).is_err());
    }

    #[test]
    fn same_second_tokens_differ() {
        let codec = codec();
        let a = codec.issue_at(1, "alice", Duration::from_secs(60), 1_000).unwrap();
        let b = codec.issue_at(1, "alice", Duration::from_secs(60), 1_000).unwrap();
        assert_ne!(a.token, b.token);
    }

    #[test]
    fn short_or_missing_secret_is_refused() {
        assert!(matches!(TokenCodec::new(b""), Err(TokenKeyError::Missing)));
        assert!(matches!(
            TokenCodec::new(b"short"),
            Err(TokenKeyError::TooShort { len: 5, min: 32 })
        ));
    }

    #[test]
    fn codec_errors_map_to_auth_errors() {
        assert!(matches!(AuthError::from(TokenError::BadSignature), AuthError::TokenMalformed));
        assert!(matches!(AuthError::from(TokenError::Expired), AuthError::TokenExpired));
    }
}
