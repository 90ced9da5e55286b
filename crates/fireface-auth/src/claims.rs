//! ID token claims.
//!
//! [`IdTokenClaims`] is the raw, absence-aware payload as it appears on the
//! wire; [`DecodedIdToken`] is what callers get back once every check has
//! passed. The subject and email are redacted in Debug output to keep user
//! identifiers out of logs.

use chrono::{DateTime, TimeZone, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Payload claims before validation.
///
/// Every field is optional so that a missing claim and a mistyped claim can
/// be told apart: mistyped fails deserialization, missing is `None`.
#[derive(Clone, Default, Deserialize)]
pub struct IdTokenClaims {
    #[serde(default)]
    pub iss: Option<String>,

    #[serde(default)]
    pub sub: Option<String>,

    /// Expiration timestamp (Unix epoch seconds).
    #[serde(default, deserialize_with = "numeric_date")]
    pub exp: Option<i64>,

    /// Issued-at timestamp (Unix epoch seconds).
    #[serde(default, deserialize_with = "numeric_date")]
    pub iat: Option<i64>,

    /// Not-before timestamp (Unix epoch seconds).
    #[serde(default, deserialize_with = "numeric_date")]
    pub nbf: Option<i64>,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub email_verified: Option<bool>,
}

impl fmt::Debug for IdTokenClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdTokenClaims")
            .field("iss", &self.iss)
            .field("sub", &self.sub.as_ref().map(|_| "[REDACTED]"))
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .field("nbf", &self.nbf)
            .field("email", &self.email.as_ref().map(|_| "[REDACTED]"))
            .field("email_verified", &self.email_verified)
            .finish()
    }
}

/// A verified Fireface ID token.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct DecodedIdToken {
    /// User email, when the token carries one. Redacted in Debug output.
    pub email: Option<String>,

    pub email_verified: Option<bool>,

    /// Expiration time.
    pub exp: DateTime<Utc>,

    /// Issued-at time.
    pub iat: DateTime<Utc>,

    /// Issuer.
    pub iss: String,

    /// Subject (user id). Redacted in Debug output.
    pub sub: String,
}

impl fmt::Debug for DecodedIdToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedIdToken")
            .field("email", &self.email.as_ref().map(|_| "[REDACTED]"))
            .field("email_verified", &self.email_verified)
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .field("iss", &self.iss)
            .field("sub", &"[REDACTED]")
            .finish()
    }
}

/// RFC 7519 NumericDate: any JSON number, truncated to whole seconds.
///
/// Strings and other non-numbers are still a decoding error.
fn numeric_date<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(number) = Option::<serde_json::Number>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if let Some(secs) = number.as_i64() {
        return Ok(Some(secs));
    }
    match number.as_f64() {
        // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive.
        Some(secs) if secs.is_finite() && secs >= i64::MIN as f64 && secs < i64::MAX as f64 => {
            Ok(Some(secs.trunc() as i64))
        }
        _ => Err(D::Error::custom("NumericDate out of range")),
    }
}

/// Convert Unix seconds to a UTC timestamp, `None` when out of range.
pub(crate) fn from_unix(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn token() -> DecodedIdToken {
        DecodedIdToken {
            email: Some("person@example.com".to_string()),
            email_verified: Some(true),
            exp: from_unix(1_700_003_600).unwrap(),
            iat: from_unix(1_700_000_000).unwrap(),
            iss: "https://issuer".to_string(),
            sub: "secret-user-id".to_string(),
        }
    }

    #[test]
    fn test_decoded_token_debug_redacts_identifiers() {
        let debug_str = format!("{:?}", token());

        assert!(!debug_str.contains("secret-user-id"));
        assert!(!debug_str.contains("person@example.com"));
        assert!(debug_str.contains("[REDACTED]"));
        assert!(debug_str.contains("https://issuer"));
    }

    #[test]
    fn test_raw_claims_debug_redacts_identifiers() {
        let claims: IdTokenClaims =
            serde_json::from_str(r#"{"sub":"secret-user-id","email":"person@example.com"}"#)
                .unwrap();
        let debug_str = format!("{claims:?}");

        assert!(!debug_str.contains("secret-user-id"));
        assert!(!debug_str.contains("person@example.com"));
    }

    #[test]
    fn test_raw_claims_absence_and_types() {
        let claims: IdTokenClaims = serde_json::from_str(r#"{"iss":"x","exp":10}"#).unwrap();
        assert_eq!(claims.iss.as_deref(), Some("x"));
        assert_eq!(claims.exp, Some(10));
        assert!(claims.sub.is_none());
        assert!(claims.email_verified.is_none());

        // Wrong type is an error, not a silent None.
        assert!(serde_json::from_str::<IdTokenClaims>(r#"{"exp":"soon"}"#).is_err());
        assert!(serde_json::from_str::<IdTokenClaims>(r#"{"email_verified":"yes"}"#).is_err());
    }

    #[test]
    fn test_fractional_numeric_dates_truncate() {
        let claims: IdTokenClaims =
            serde_json::from_str(r#"{"exp":1700003600.9,"iat":1700000000.25,"nbf":-1.5}"#)
                .unwrap();
        assert_eq!(claims.exp, Some(1_700_003_600));
        assert_eq!(claims.iat, Some(1_700_000_000));
        assert_eq!(claims.nbf, Some(-1));

        assert!(serde_json::from_str::<IdTokenClaims>(r#"{"exp":1e300}"#).is_err());
        assert!(serde_json::from_str::<IdTokenClaims>(r#"{"iat":[1]}"#).is_err());
        assert!(serde_json::from_str::<IdTokenClaims>(r#"{"nbf":null}"#)
            .unwrap()
            .nbf
            .is_none());
    }

    #[test]
    fn test_raw_claims_ignore_unknown_members() {
        let claims: IdTokenClaims =
            serde_json::from_str(r#"{"sub":"a","aud":"client","custom":{"k":1}}"#).unwrap();
        assert_eq!(claims.sub.as_deref(), Some("a"));
    }

    #[test]
    fn test_from_unix() {
        assert_eq!(from_unix(0).unwrap().timestamp(), 0);
        assert!(from_unix(i64::MAX).is_none());
    }

    #[test]
    fn test_decoded_token_serializes_timestamps() {
        let json = serde_json::to_value(token()).unwrap();
        assert_eq!(json["sub"], "secret-user-id");
        assert!(json["exp"].as_str().unwrap().starts_with("2023-11-14"));
    }
}
