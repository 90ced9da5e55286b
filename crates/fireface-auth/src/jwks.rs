//! JWKS fetching and key-set parsing.
//!
//! The Fireface server publishes its verification keys at
//! `{base_url}/.well-known/jwks.json`. This module turns that document into
//! an immutable [`KeySet`] with key material already prepared for
//! verification, so that a bad key is found at fetch time rather than when a
//! token arrives.
//!
//! # Security
//!
//! - Only asymmetric key types are accepted (RSA, EC P-256/P-384, Ed25519)
//! - Keys marked `"use": "enc"` are never used for signatures
//! - RSA moduli shorter than 2048 bits are rejected
//! - HTTPS should be used in production (warned about in config validation)

use crate::config::InvalidKeyPolicy;
use crate::errors::{FetchError, ParseError, RefreshError};
use async_trait::async_trait;
use common::jwt::decode_base64url;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::instrument;

/// Smallest RSA modulus accepted for signature verification.
pub const MIN_RSA_MODULUS_BITS: usize = 2048;

/// Upper bound on the JWKS body, checked before parsing.
pub const MAX_JWKS_BODY_BYTES: usize = 512 * 1024;

/// JSON Web Key as published by the server.
///
/// Every member is optional at this layer so that one bad key can be
/// reported (or skipped) without failing the whole document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA", "EC", "OKP").
    #[serde(default)]
    pub kty: Option<String>,

    /// Key ID - used to select the correct key for verification.
    #[serde(default)]
    pub kid: Option<String>,

    /// Algorithm the key is intended for.
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use ("sig" or "enc").
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,

    /// Curve for EC and OKP keys.
    #[serde(default)]
    pub crv: Option<String>,

    /// EC x coordinate, or the Ed25519 public key (base64url).
    #[serde(default)]
    pub x: Option<String>,

    /// EC y coordinate (base64url).
    #[serde(default)]
    pub y: Option<String>,
}

/// Raw JWKS document. Keys stay untyped until [`parse_key_set`] looks at
/// them one by one.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksDocument {
    pub keys: Vec<serde_json::Value>,
}

/// Elliptic curves supported for EC keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcCurve {
    P256,
    P384,
}

/// Key family, which decides the algorithms a key can verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Rsa,
    Ec(EcCurve),
    Ed25519,
}

impl KeyType {
    /// Whether a token signed with `alg` can be verified by this key type.
    ///
    /// Symmetric algorithms are never compatible.
    #[must_use]
    pub fn supports(self, alg: Algorithm) -> bool {
        match self {
            KeyType::Rsa => matches!(
                alg,
                Algorithm::RS256
                    | Algorithm::RS384
                    | Algorithm::RS512
                    | Algorithm::PS256
                    | Algorithm::PS384
                    | Algorithm::PS512
            ),
            KeyType::Ec(EcCurve::P256) => alg == Algorithm::ES256,
            KeyType::Ec(EcCurve::P384) => alg == Algorithm::ES384,
            KeyType::Ed25519 => alg == Algorithm::EdDSA,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            KeyType::Rsa => "RSA",
            KeyType::Ec(EcCurve::P256) => "EC/P-256",
            KeyType::Ec(EcCurve::P384) => "EC/P-384",
            KeyType::Ed25519 => "OKP/Ed25519",
        }
    }
}

/// A verification key ready for use.
#[derive(Clone)]
pub struct VerificationKey {
    /// Key identifier, unique within its key set.
    pub kid: String,

    pub key_type: KeyType,

    /// Declared algorithm; when present a token must use exactly this one.
    pub alg: Option<Algorithm>,

    pub(crate) decoding_key: DecodingKey,
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationKey")
            .field("kid", &self.kid)
            .field("key_type", &self.key_type)
            .field("alg", &self.alg)
            .finish_non_exhaustive()
    }
}

impl VerificationKey {
    /// Whether a token header declaring `alg` may be checked against this key.
    #[must_use]
    pub fn accepts(&self, alg: Algorithm) -> bool {
        self.key_type.supports(alg) && self.alg.map_or(true, |declared| declared == alg)
    }

    /// Prepared key material.
    #[must_use]
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    /// Build a key from its JWK representation.
    ///
    /// `index` is the position in the document, used in errors for keys
    /// without a `kid`.
    ///
    /// # Errors
    ///
    /// Returns the `ParseError` describing the first problem found.
    pub fn from_jwk(jwk: &Jwk, index: usize) -> Result<Self, ParseError> {
        let kid = jwk
            .kid
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(ParseError::MissingField { index, field: "kid" })?
            .to_string();
        let kty = jwk
            .kty
            .as_deref()
            .ok_or(ParseError::MissingField { index, field: "kty" })?;

        let invalid = |reason: String| ParseError::InvalidKeyMaterial {
            kid: kid.clone(),
            reason,
        };

        let alg = jwk
            .alg
            .as_deref()
            .map(|a| Algorithm::from_str(a).map_err(|_| invalid(format!("unknown alg {a}"))))
            .transpose()?;

        let (key_type, decoding_key) = match kty {
            "RSA" => {
                let n = required(jwk.n.as_deref(), index, "n")?;
                let e = required(jwk.e.as_deref(), index, "e")?;

                let modulus = decode_base64url(n).map_err(|e| invalid(format!("n: {e}")))?;
                let bits = significant_bits(&modulus);
                if bits < MIN_RSA_MODULUS_BITS {
                    return Err(invalid(format!(
                        "RSA modulus is {bits} bits, minimum is {MIN_RSA_MODULUS_BITS}"
                    )));
                }

                let key = DecodingKey::from_rsa_components(n, e)
                    .map_err(|e| invalid(format!("RSA components: {e}")))?;
                (KeyType::Rsa, key)
            }
            "EC" => {
                let crv = required(jwk.crv.as_deref(), index, "crv")?;
                let (curve, coord_len) = match crv {
                    "P-256" => (EcCurve::P256, 32),
                    "P-384" => (EcCurve::P384, 48),
                    other => {
                        return Err(ParseError::UnsupportedKeyType {
                            kid,
                            kty: format!("EC/{other}"),
                        })
                    }
                };
                let x = required(jwk.x.as_deref(), index, "x")?;
                let y = required(jwk.y.as_deref(), index, "y")?;

                for (name, coord) in [("x", x), ("y", y)] {
                    let bytes = decode_base64url(coord).map_err(|e| invalid(format!("{name}: {e}")))?;
                    if bytes.len() != coord_len {
                        return Err(invalid(format!(
                            "{name} is {} bytes, expected {coord_len}",
                            bytes.len()
                        )));
                    }
                }

                let key = DecodingKey::from_ec_components(x, y)
                    .map_err(|e| invalid(format!("EC components: {e}")))?;
                (KeyType::Ec(curve), key)
            }
            "OKP" => {
                let crv = required(jwk.crv.as_deref(), index, "crv")?;
                if crv != "Ed25519" {
                    return Err(ParseError::UnsupportedKeyType {
                        kid,
                        kty: format!("OKP/{crv}"),
                    });
                }
                let x = required(jwk.x.as_deref(), index, "x")?;
                let bytes = decode_base64url(x).map_err(|e| invalid(format!("x: {e}")))?;
                if bytes.len() != 32 {
                    return Err(invalid(format!("x is {} bytes, expected 32", bytes.len())));
                }

                let key = DecodingKey::from_ed_components(x)
                    .map_err(|e| invalid(format!("OKP components: {e}")))?;
                (KeyType::Ed25519, key)
            }
            other => {
                return Err(ParseError::UnsupportedKeyType {
                    kid,
                    kty: other.to_string(),
                })
            }
        };

        if let Some(alg) = alg {
            if !key_type.supports(alg) {
                return Err(invalid(format!(
                    "alg {alg:?} is not usable with {}",
                    key_type.as_str()
                )));
            }
        }

        Ok(Self {
            kid,
            key_type,
            alg,
            decoding_key,
        })
    }
}

fn required<'a>(
    value: Option<&'a str>,
    index: usize,
    field: &'static str,
) -> Result<&'a str, ParseError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or(ParseError::MissingField { index, field })
}

fn significant_bits(big_endian: &[u8]) -> usize {
    let mut bytes = big_endian.iter().skip_while(|b| **b == 0);
    match bytes.next() {
        Some(first) => (8 - first.leading_zeros() as usize) + 8 * bytes.count(),
        None => 0,
    }
}

/// An immutable snapshot of verification keys, indexed by `kid`.
#[derive(Clone, Default)]
pub struct KeySet {
    keys: Vec<VerificationKey>,
    index: HashMap<String, usize>,
}

impl fmt::Debug for KeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySet")
            .field("kids", &self.kids().collect::<Vec<_>>())
            .finish()
    }
}

impl KeySet {
    /// Build a key set, rejecting duplicate identifiers.
    ///
    /// # Errors
    ///
    /// Returns `ParseError::DuplicateKeyId` if two keys share a `kid`.
    pub fn new(keys: Vec<VerificationKey>) -> Result<Self, ParseError> {
        let mut index = HashMap::with_capacity(keys.len());
        for (i, key) in keys.iter().enumerate() {
            if index.insert(key.kid.clone(), i).is_some() {
                return Err(ParseError::DuplicateKeyId(key.kid.clone()));
            }
        }
        Ok(Self { keys, index })
    }

    /// Look up a key by identifier.
    #[must_use]
    pub fn get(&self, kid: &str) -> Option<&VerificationKey> {
        self.index.get(kid).and_then(|i| self.keys.get(*i))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key identifiers in document order.
    pub fn kids(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|k| k.kid.as_str())
    }
}

/// Parse a JWKS body into a [`KeySet`].
///
/// # Errors
///
/// - `FetchError::InvalidBody` if the body is not a `{"keys": [...]}` document
/// - `ParseError` for unusable keys under [`InvalidKeyPolicy::Reject`], or
///   `ParseError::NoUsableKeys` when nothing remains
pub fn parse_key_set(body: &[u8], policy: InvalidKeyPolicy) -> Result<KeySet, RefreshError> {
    let document: JwksDocument = serde_json::from_slice(body).map_err(|e| {
        tracing::error!(target: "fireface.auth.jwks", error = %e, "Failed to parse JWKS response");
        FetchError::InvalidBody(e.to_string())
    })?;

    let mut keys: Vec<VerificationKey> = Vec::with_capacity(document.keys.len());
    for (index, value) in document.keys.into_iter().enumerate() {
        let parsed = serde_json::from_value::<Jwk>(value)
            .map_err(|e| ParseError::InvalidKeyMaterial {
                kid: format!("#{index}"),
                reason: e.to_string(),
            })
            .and_then(|jwk| {
                if jwk.key_use.as_deref() == Some("enc") {
                    return Ok(None);
                }
                VerificationKey::from_jwk(&jwk, index).map(Some)
            });

        let key = match parsed {
            Ok(Some(key)) => key,
            Ok(None) => {
                tracing::debug!(target: "fireface.auth.jwks", index, "Skipping encryption key");
                continue;
            }
            Err(e) => match policy {
                InvalidKeyPolicy::Skip => {
                    tracing::warn!(target: "fireface.auth.jwks", index, error = %e, "Skipping unusable JWK");
                    continue;
                }
                InvalidKeyPolicy::Reject => {
                    tracing::error!(target: "fireface.auth.jwks", index, error = %e, "Rejecting JWKS with unusable key");
                    return Err(e.into());
                }
            },
        };

        if keys.iter().any(|k| k.kid == key.kid) {
            match policy {
                InvalidKeyPolicy::Skip => {
                    tracing::warn!(target: "fireface.auth.jwks", kid = %key.kid, "Skipping duplicate JWK, keeping first");
                    continue;
                }
                InvalidKeyPolicy::Reject => {
                    return Err(ParseError::DuplicateKeyId(key.kid).into());
                }
            }
        }

        tracing::debug!(target: "fireface.auth.jwks", kid = %key.kid, key_type = key.key_type.as_str(), "Loaded JWK");
        keys.push(key);
    }

    if keys.is_empty() {
        tracing::error!(target: "fireface.auth.jwks", "JWKS contains no usable keys");
        return Err(ParseError::NoUsableKeys.into());
    }

    Ok(KeySet::new(keys)?)
}

/// Where key sets come from.
///
/// The production implementation is [`JwksFetcher`]; tests substitute
/// scripted sources.
#[async_trait]
pub trait KeySetSource: Send + Sync {
    /// Retrieve and parse a complete key set. No retries.
    async fn fetch(&self) -> Result<KeySet, RefreshError>;

    /// Endpoint description for logs.
    fn endpoint(&self) -> &str;
}

/// Fetches the key set over HTTP.
pub struct JwksFetcher {
    /// URL to the JWKS endpoint.
    jwks_url: String,

    /// HTTP client for fetching JWKS.
    http_client: reqwest::Client,

    invalid_key_policy: InvalidKeyPolicy,
}

impl JwksFetcher {
    /// Create a fetcher using an already configured HTTP client.
    #[must_use]
    pub fn new(
        jwks_url: String,
        http_client: reqwest::Client,
        invalid_key_policy: InvalidKeyPolicy,
    ) -> Self {
        Self {
            jwks_url,
            http_client,
            invalid_key_policy,
        }
    }
}

#[async_trait]
impl KeySetSource for JwksFetcher {
    #[instrument(skip_all, fields(url = %self.jwks_url))]
    async fn fetch(&self) -> Result<KeySet, RefreshError> {
        tracing::debug!(target: "fireface.auth.jwks", url = %self.jwks_url, "Fetching JWKS");

        let mut response = self
            .http_client
            .get(&self.jwks_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::error!(target: "fireface.auth.jwks", url = %self.jwks_url, error = %e, "Failed to fetch JWKS");
                if e.is_timeout() {
                    FetchError::Timeout
                } else {
                    FetchError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(
                target: "fireface.auth.jwks",
                url = %self.jwks_url,
                status = %status,
                "JWKS endpoint returned error"
            );
            return Err(FetchError::Status(status.as_u16()).into());
        }

        if let Some(declared) = response.content_length() {
            if declared > MAX_JWKS_BODY_BYTES as u64 {
                return Err(body_too_large(&self.jwks_url, declared).into());
            }
        }

        // Content-Length may be absent or wrong, so the cap is enforced per chunk.
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| {
            tracing::error!(target: "fireface.auth.jwks", error = %e, "Failed to read JWKS response");
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Request(e.to_string())
            }
        })? {
            let received = body.len() + chunk.len();
            if received > MAX_JWKS_BODY_BYTES {
                return Err(body_too_large(&self.jwks_url, received as u64).into());
            }
            body.extend_from_slice(&chunk);
        }

        let key_set = parse_key_set(&body, self.invalid_key_policy)?;

        tracing::info!(
            target: "fireface.auth.jwks",
            url = %self.jwks_url,
            key_count = key_set.len(),
            "JWKS fetched"
        );

        Ok(key_set)
    }

    fn endpoint(&self) -> &str {
        &self.jwks_url
    }
}

fn body_too_large(url: &str, bytes: u64) -> FetchError {
    tracing::error!(
        target: "fireface.auth.jwks",
        url = %url,
        bytes,
        limit = MAX_JWKS_BODY_BYTES,
        "JWKS response too large"
    );
    FetchError::InvalidBody(format!(
        "body exceeds {MAX_JWKS_BODY_BYTES} bytes"
    ))
}
