//! Builder patterns for test token construction.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Map, Value};

use crate::test_ids::{TEST_ISSUER, TEST_SUBJECT};

/// Builder for ID token claims.
///
/// # Example
/// ```rust,ignore
/// let claims = TestTokenBuilder::new()
///     .for_user("user-42")
///     .with_email("a@example.com", true)
///     .expires_in(3600)
///     .build();
/// ```
pub struct TestTokenBuilder {
    claims: Map<String, Value>,
}

impl TestTokenBuilder {
    /// Claims issued now, valid for an hour.
    pub fn new() -> Self {
        Self::at(Utc::now().timestamp())
    }

    /// Claims issued at `now`, valid for an hour.
    pub fn at(now: i64) -> Self {
        let mut claims = Map::new();
        claims.insert("iss".into(), json!(TEST_ISSUER));
        claims.insert("sub".into(), json!(TEST_SUBJECT));
        claims.insert("iat".into(), json!(now));
        claims.insert("exp".into(), json!(now + 3600));
        Self { claims }
    }

    /// Set the subject.
    pub fn for_user(self, subject: &str) -> Self {
        self.with_claim("sub", json!(subject))
    }

    /// Set the issuer.
    pub fn issued_by(self, issuer: &str) -> Self {
        self.with_claim("iss", json!(issuer))
    }

    /// Set expiration in seconds from now.
    pub fn expires_in(self, seconds: i64) -> Self {
        let exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self.expires_at(exp)
    }

    pub fn expires_at(self, timestamp: i64) -> Self {
        self.with_claim("exp", json!(timestamp))
    }

    pub fn not_before(self, timestamp: i64) -> Self {
        self.with_claim("nbf", json!(timestamp))
    }

    pub fn with_email(self, email: &str, verified: bool) -> Self {
        self.with_claim("email", json!(email))
            .with_claim("email_verified", json!(verified))
    }

    /// Set an arbitrary claim, replacing any previous value.
    pub fn with_claim(mut self, name: &str, value: Value) -> Self {
        self.claims.insert(name.to_string(), value);
        self
    }

    /// Remove a claim entirely.
    pub fn without(mut self, name: &str) -> Self {
        self.claims.remove(name);
        self
    }

    /// Build the claims as a JSON value.
    pub fn build(self) -> Value {
        Value::Object(self.claims)
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Replace the payload of a signed token, keeping header and signature.
pub fn tamper_payload(token: &str, claims: &Value) -> String {
    let parts: Vec<&str> = token.split('.').collect();
    assert_eq!(parts.len(), 3, "expected a compact JWS");
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).expect("serialize claims"));
    format!("{}.{}.{}", parts[0], payload, parts[2])
}

/// Assemble a token from raw header and payload JSON with a junk signature.
pub fn unsigned_token(header: &Value, claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header).expect("serialize header"));
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).expect("serialize claims"));
    format!("{header}.{payload}.c2lnbmF0dXJl")
}

/// HS256 token with the given `kid`, for algorithm-confusion tests.
pub fn hs256_token(kid: &str, claims: &Value, secret: &[u8]) -> String {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(kid.to_string());
    encode(&header, claims, &EncodingKey::from_secret(secret)).expect("Failed to sign token")
}
