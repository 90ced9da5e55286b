//! ID token verification.
//!
//! Verifies Fireface ID tokens against a [`KeySet`] snapshot. Verification is
//! synchronous and takes `now` explicitly so that time-dependent behavior is
//! testable without a clock.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - The header `alg` must fit the key selected by `kid`; `HS*` and `none`
//!   are never accepted
//! - The signature is checked before any claim is trusted
//! - Raw tokens are never logged

use crate::claims::{from_unix, DecodedIdToken, IdTokenClaims};
use crate::config::AuthConfig;
use crate::errors::VerifyError;
use crate::jwks::KeySet;
use common::jwt::{
    decode_header, decode_segment, split_token, validate_iat_at, validate_nbf_at,
    DEFAULT_CLOCK_SKEW,
};
use std::time::Duration;

/// Claim checks beyond signature and expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyOptions {
    /// Tolerance for `iat`/`nbf` in the future.
    pub clock_skew: Duration,

    /// Required `iss`, if any.
    pub expected_issuer: Option<String>,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            clock_skew: DEFAULT_CLOCK_SKEW,
            expected_issuer: None,
        }
    }
}

impl From<&AuthConfig> for VerifyOptions {
    fn from(config: &AuthConfig) -> Self {
        Self {
            clock_skew: config.clock_skew,
            expected_issuer: config.expected_issuer.clone(),
        }
    }
}

/// Verify `token` against `key_set` at Unix time `now`.
///
/// # Verification order
///
/// 1. Size and structure
/// 2. Header `alg` and `kid`
/// 3. Key lookup by `kid`
/// 4. Algorithm compatibility with the key
/// 5. Signature over `header.payload`
/// 6. Typed claims (`iss`, `sub`, `exp`, `iat` required)
/// 7. `exp`, then `iat`/`nbf`, then issuer
///
/// # Errors
///
/// Returns the [`VerifyError`] for the first check that fails.
pub fn verify_at(
    token: &str,
    key_set: &KeySet,
    now: i64,
    options: &VerifyOptions,
) -> Result<DecodedIdToken, VerifyError> {
    tracing::debug!(target: "fireface.auth.jwt", token_size = token.len(), "Verifying ID token");

    let parts = split_token(token).map_err(|e| VerifyError::MalformedToken(e.to_string()))?;
    let header = decode_header(&parts).map_err(|e| VerifyError::MalformedToken(e.to_string()))?;

    let Some(key) = key_set.get(&header.kid) else {
        tracing::debug!(
            target: "fireface.auth.jwt",
            kid = %header.kid,
            key_count = key_set.len(),
            "Token signed with unknown key"
        );
        return Err(VerifyError::UnknownKey(header.kid));
    };

    // crypto::verify assumes the key family matches the algorithm.
    if !key.accepts(header.alg) {
        tracing::warn!(
            target: "fireface.auth.jwt",
            kid = %key.kid,
            alg = ?header.alg,
            key_type = key.key_type.as_str(),
            "Token algorithm not allowed for key"
        );
        return Err(VerifyError::AlgorithmMismatch(key.kid.clone()));
    }

    let valid = jsonwebtoken::crypto::verify(
        parts.signature,
        parts.signing_input.as_bytes(),
        key.decoding_key(),
        header.alg,
    )
    .unwrap_or_else(|e| {
        tracing::debug!(target: "fireface.auth.jwt", kid = %key.kid, error = %e, "Signature could not be checked");
        false
    });
    if !valid {
        tracing::debug!(target: "fireface.auth.jwt", kid = %key.kid, "Token signature invalid");
        return Err(VerifyError::InvalidSignature);
    }

    let claims: IdTokenClaims = decode_segment(parts.payload, "payload")
        .map_err(|e| VerifyError::MalformedToken(e.to_string()))?;

    let (Some(iss), Some(sub), Some(exp), Some(iat)) =
        (claims.iss, claims.sub, claims.exp, claims.iat)
    else {
        return Err(VerifyError::MalformedToken(
            "token is missing a required claim".to_string(),
        ));
    };

    if now >= exp {
        tracing::debug!(target: "fireface.auth.jwt", exp, now, "Token expired");
        return Err(VerifyError::ExpiredToken);
    }

    validate_iat_at(iat, options.clock_skew, now).map_err(|_| VerifyError::TokenNotYetValid)?;
    validate_nbf_at(claims.nbf, options.clock_skew, now)
        .map_err(|_| VerifyError::TokenNotYetValid)?;

    if let Some(expected) = &options.expected_issuer {
        if &iss != expected {
            tracing::debug!(target: "fireface.auth.jwt", iss = %iss, "Token issuer not trusted");
            return Err(VerifyError::InvalidIssuer);
        }
    }

    let (Some(exp), Some(iat)) = (from_unix(exp), from_unix(iat)) else {
        return Err(VerifyError::MalformedToken(
            "token timestamp out of range".to_string(),
        ));
    };

    tracing::debug!(target: "fireface.auth.jwt", kid = %key.kid, "Token verified");

    Ok(DecodedIdToken {
        email: claims.email,
        email_verified: claims.email_verified,
        exp,
        iat,
        iss,
        sub,
    })
}
