//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports [`secrecy`] types. The SDK holds two kinds of secrets: the
//! server secret key used to authenticate outbound API calls, and user
//! passwords carried by update requests.
//!
//! `SecretString` implements `Debug` with redaction, so any struct deriving
//! `Debug` that contains one is safe to log via `{:?}` or `tracing`. Secrets
//! are zeroized when dropped.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct Credentials {
//!     base_url: String,
//!     secret_key: SecretString,
//! }
//!
//! let creds = Credentials {
//!     base_url: "https://fireface.example".to_string(),
//!     secret_key: SecretString::from("sk_live_123"),
//! };
//!
//! assert!(!format!("{creds:?}").contains("sk_live_123"));
//! assert_eq!(creds.secret_key.expose_secret(), "sk_live_123");
//! ```

pub use secrecy::{ExposeSecret, SecretString};

/// Serialize a `SecretString` as its plain value.
///
/// `secrecy` deliberately does not implement `Serialize`; request bodies that
/// must carry a secret opt in field by field with
/// `#[serde(serialize_with = "common::secret::serialize_exposed")]`.
///
/// # Errors
///
/// Propagates serializer errors.
pub fn serialize_exposed<S>(secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(secret.expose_secret())
}

/// `serialize_exposed` for optional secrets.
///
/// # Errors
///
/// Propagates serializer errors.
#[allow(clippy::ref_option)]
pub fn serialize_exposed_opt<S>(
    secret: &Option<SecretString>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match secret {
        Some(secret) => serializer.serialize_some(secret.expose_secret()),
        None => serializer.serialize_none(),
    }
}
