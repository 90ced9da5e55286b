//! Compact JWT utilities shared by the Fireface crates.
//!
//! This module provides the structural half of token validation:
//! - Size limits for DoS prevention
//! - Clock skew constants for `iat`/`nbf` validation
//! - Splitting a compact token into its three segments
//! - Header decoding (`alg`, `kid`) without verifying the signature
//! - Time-claim checks against an explicit `now`
//!
//! Signature verification and key lookup live in `fireface-auth`.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE any base64 or JSON work
//! - Header values are only hints for key lookup; nothing here is trusted
//!   until the signature has been verified
//! - Raw token contents are never logged
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{split_token, decode_header, validate_iat_at, DEFAULT_CLOCK_SKEW};
//!
//! let parts = split_token(token)?;
//! let header = decode_header(&parts)?;
//! // ... look up header.kid, verify parts.signing_input against parts.signature ...
//! validate_iat_at(claims.iat, DEFAULT_CLOCK_SKEW, now)?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::Algorithm;
use serde::de::DeserializeOwned;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// Identity tokens are typically 700-1500 bytes with an RSA signature. Tokens
/// larger than this are rejected BEFORE any parsing or cryptographic work.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Default clock skew tolerance for `iat`/`nbf` (5 minutes).
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Maximum allowed clock skew tolerance (10 minutes).
///
/// Configuration above this value is rejected.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Structural errors found before any key material is involved.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtFormatError {
    /// Token size exceeds [`MAX_JWT_SIZE_BYTES`].
    #[error("token exceeds {MAX_JWT_SIZE_BYTES} bytes")]
    TokenTooLarge,

    /// Token is not three non-empty dot-separated segments.
    #[error("token is not a compact JWS")]
    InvalidStructure,

    /// A segment is not valid base64url or not the expected JSON.
    #[error("token {0} segment could not be decoded")]
    InvalidSegment(&'static str),

    /// Header has no usable `kid`.
    #[error("token header has no key identifier")]
    MissingKid,

    /// Header `alg` is absent or not a known JWS algorithm.
    #[error("token header has an unsupported algorithm")]
    UnsupportedAlgorithm,
}

/// Time-based claim violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClaimTimeError {
    /// Token `iat` claim is too far in the future.
    #[error("token issued-at is in the future")]
    IatTooFarInFuture,

    /// Token `nbf` claim has not been reached yet.
    #[error("token is not valid yet")]
    NotYetValid,
}

// =============================================================================
// Token structure
// =============================================================================

/// Borrowed view of the three segments of a compact token.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TokenParts<'a> {
    /// Base64url header segment.
    pub header: &'a str,
    /// Base64url payload segment.
    pub payload: &'a str,
    /// Base64url signature segment.
    pub signature: &'a str,
    /// `header.payload`, the bytes the signature covers.
    pub signing_input: &'a str,
}

// Segments are token material; only their sizes are printable.
impl std::fmt::Debug for TokenParts<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenParts")
            .field("header_len", &self.header.len())
            .field("payload_len", &self.payload.len())
            .field("signature_len", &self.signature.len())
            .finish()
    }
}

/// The header fields needed to select and use a verification key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHeader {
    /// Declared signature algorithm.
    pub alg: Algorithm,
    /// Key identifier, guaranteed non-empty.
    pub kid: String,
}

/// Split a compact token into header, payload and signature segments.
///
/// # Errors
///
/// - `TokenTooLarge` if the token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `InvalidStructure` unless there are exactly three non-empty segments
pub fn split_token(token: &str) -> Result<TokenParts<'_>, JwtFormatError> {
    // Check token size first (DoS prevention)
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtFormatError::TokenTooLarge);
    }

    let mut segments = token.split('.');
    let (Some(header), Some(payload), Some(signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        tracing::debug!(
            target: "common.jwt",
            segments = token.split('.').count(),
            "Token rejected: invalid JWT format"
        );
        return Err(JwtFormatError::InvalidStructure);
    };

    if header.is_empty() || payload.is_empty() || signature.is_empty() {
        tracing::debug!(target: "common.jwt", "Token rejected: empty JWT segment");
        return Err(JwtFormatError::InvalidStructure);
    }

    // header + '.' + payload
    let signing_input = token
        .get(..header.len() + 1 + payload.len())
        .ok_or(JwtFormatError::InvalidStructure)?;

    Ok(TokenParts {
        header,
        payload,
        signature,
        signing_input,
    })
}

/// Decode a base64url segment into a JSON type.
///
/// `segment` names the segment in the returned error.
///
/// # Errors
///
/// Returns `InvalidSegment` on bad base64url or JSON that does not match `T`.
pub fn decode_segment<T: DeserializeOwned>(
    encoded: &str,
    segment: &'static str,
) -> Result<T, JwtFormatError> {
    let bytes = URL_SAFE_NO_PAD.decode(encoded).map_err(|e| {
        tracing::debug!(target: "common.jwt", segment, error = %e, "Failed to decode JWT base64");
        JwtFormatError::InvalidSegment(segment)
    })?;

    serde_json::from_slice(&bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", segment, error = %e, "Failed to parse JWT JSON");
        JwtFormatError::InvalidSegment(segment)
    })
}

/// Decode the token header and extract `alg` and `kid`.
///
/// This does NOT validate the signature. The `kid` must only be used for a
/// lookup in a trusted key set, and the token must still be verified.
///
/// # Errors
///
/// - `InvalidSegment("header")` on bad base64url/JSON or a non-object header
/// - `UnsupportedAlgorithm` if `alg` is absent, not a string, or unknown
/// - `MissingKid` if `kid` is absent, not a string, or empty
pub fn decode_header(parts: &TokenParts<'_>) -> Result<TokenHeader, JwtFormatError> {
    let header: serde_json::Value = decode_segment(parts.header, "header")?;
    if !header.is_object() {
        return Err(JwtFormatError::InvalidSegment("header"));
    }

    let alg = header
        .get("alg")
        .and_then(|v| v.as_str())
        .and_then(|s| Algorithm::from_str(s).ok())
        .ok_or(JwtFormatError::UnsupportedAlgorithm)?;

    // Reject empty values for defense-in-depth
    let kid = header
        .get("kid")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or(JwtFormatError::MissingKid)?;

    Ok(TokenHeader { alg, kid })
}

// =============================================================================
// Time claims
// =============================================================================

/// Validate the `iat` (issued-at) claim against an explicit `now`.
///
/// Tokens issued more than `clock_skew` in the future are rejected.
///
/// # Errors
///
/// Returns `ClaimTimeError::IatTooFarInFuture` if `iat > now + clock_skew`.
pub fn validate_iat_at(iat: i64, clock_skew: Duration, now: i64) -> Result<(), ClaimTimeError> {
    let max_iat = now.saturating_add(skew_secs(clock_skew));

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            "Token rejected: iat too far in the future"
        );
        return Err(ClaimTimeError::IatTooFarInFuture);
    }

    Ok(())
}

/// Validate an optional `nbf` (not-before) claim against an explicit `now`.
///
/// # Errors
///
/// Returns `ClaimTimeError::NotYetValid` if `nbf > now + clock_skew`.
pub fn validate_nbf_at(
    nbf: Option<i64>,
    clock_skew: Duration,
    now: i64,
) -> Result<(), ClaimTimeError> {
    let Some(nbf) = nbf else {
        return Ok(());
    };

    if nbf > now.saturating_add(skew_secs(clock_skew)) {
        tracing::debug!(target: "common.jwt", nbf = nbf, now = now, "Token rejected: nbf not reached");
        return Err(ClaimTimeError::NotYetValid);
    }

    Ok(())
}

fn skew_secs(clock_skew: Duration) -> i64 {
    i64::try_from(clock_skew.as_secs()).unwrap_or(i64::MAX)
}

/// Decode a base64url (no padding) value such as a JWK coordinate.
///
/// # Errors
///
/// Returns `base64::DecodeError` if the input is not valid base64url.
pub fn decode_base64url(value: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(value)
}

// =============================================================================
// Tests
// =============================================================================
