//! Error types for the Fireface auth client.
//!
//! Errors are grouped by the stage that produced them so that callers (and
//! logs) can tell a key-distribution problem apart from a bad token:
//!
//! - [`ConfigError`]: construction-time, always fatal
//! - [`FetchError`] / [`ParseError`]: retrieving or reading the JWKS document
//! - [`VerifyError`]: the token itself
//! - [`ApiError`]: user REST calls
//!
//! Messages never include token contents or secrets.

use crate::config::ConfigError;
use thiserror::Error;

/// Failure retrieving the JWKS document.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Connection or transport failure.
    #[error("JWKS request failed: {0}")]
    Request(String),

    /// The request did not finish within the configured timeout.
    #[error("JWKS request timed out")]
    Timeout,

    /// The caller cancelled the fetch.
    #[error("JWKS request cancelled")]
    Cancelled,

    /// Endpoint answered with a non-2xx status.
    #[error("JWKS endpoint returned status {0}")]
    Status(u16),

    /// Body is not JSON or not a key-set document.
    #[error("JWKS response body is invalid: {0}")]
    InvalidBody(String),
}

/// A key-set document that was retrieved but could not be used.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    /// Key object at `index` lacks a required member.
    #[error("JWK at index {index} is missing `{field}`")]
    MissingField {
        /// Position in the `keys` array.
        index: usize,
        /// Name of the missing member.
        field: &'static str,
    },

    /// Key type (or curve) this client cannot verify with.
    #[error("JWK {kid} has unsupported key type {kty}")]
    UnsupportedKeyType {
        /// Key identifier.
        kid: String,
        /// Declared `kty` (and `crv` where relevant).
        kty: String,
    },

    /// Public material is present but unusable.
    #[error("JWK {kid} has invalid key material: {reason}")]
    InvalidKeyMaterial {
        /// Key identifier.
        kid: String,
        /// Short description.
        reason: String,
    },

    /// Two keys share one identifier.
    #[error("JWKS contains duplicate key id {0}")]
    DuplicateKeyId(String),

    /// Nothing left to verify with.
    #[error("JWKS contains no usable signing keys")]
    NoUsableKeys,
}

/// Any failure of a key-set refresh.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RefreshError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Token verification failures.
///
/// Each variant corresponds to one step of the verification pipeline.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VerifyError {
    /// Structure, encoding, or mandatory claims are wrong.
    #[error("ID token is malformed: {0}")]
    MalformedToken(String),

    /// Header `kid` is not in the current key set.
    #[error("ID token signed with unknown key {0}")]
    UnknownKey(String),

    /// Header `alg` is not usable with the selected key.
    #[error("ID token algorithm does not match key {0}")]
    AlgorithmMismatch(String),

    /// Signature does not verify.
    #[error("ID token signature is invalid")]
    InvalidSignature,

    /// `exp` has passed.
    #[error("ID token has expired")]
    ExpiredToken,

    /// `iat` or `nbf` lies beyond the allowed clock skew.
    #[error("ID token is not valid yet")]
    TokenNotYetValid,

    /// `iss` differs from the configured issuer.
    #[error("ID token issuer is not trusted")]
    InvalidIssuer,
}

/// Failures of the user REST endpoints.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("API request failed: {0}")]
    Request(String),

    #[error("API returned status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    #[error("API response body is invalid: {0}")]
    InvalidBody(String),
}

/// The pipeline stage an [`AuthError`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Config,
    Fetch,
    Parse,
    Signature,
    Claims,
    Api,
}

impl FailureStage {
    /// Stable lowercase label, used in logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FailureStage::Config => "config",
            FailureStage::Fetch => "fetch",
            FailureStage::Parse => "parse",
            FailureStage::Signature => "signature",
            FailureStage::Claims => "claims",
            FailureStage::Api => "api",
        }
    }
}

/// Top-level error returned by [`AuthClient`](crate::client::AuthClient).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Refresh(#[from] RefreshError),

    #[error(transparent)]
    Verify(#[from] VerifyError),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl From<FetchError> for AuthError {
    fn from(e: FetchError) -> Self {
        AuthError::Refresh(RefreshError::Fetch(e))
    }
}

impl From<ParseError> for AuthError {
    fn from(e: ParseError) -> Self {
        AuthError::Refresh(RefreshError::Parse(e))
    }
}

impl VerifyError {
    /// Stage this failure belongs to.
    #[must_use]
    pub fn stage(&self) -> FailureStage {
        match self {
            VerifyError::MalformedToken(_) => FailureStage::Parse,
            VerifyError::UnknownKey(_)
            | VerifyError::AlgorithmMismatch(_)
            | VerifyError::InvalidSignature => FailureStage::Signature,
            VerifyError::ExpiredToken
            | VerifyError::TokenNotYetValid
            | VerifyError::InvalidIssuer => FailureStage::Claims,
        }
    }

    /// Bounded label for metrics.
    #[must_use]
    pub fn outcome_label(&self) -> &'static str {
        match self {
            VerifyError::MalformedToken(_) => "malformed",
            VerifyError::UnknownKey(_) => "unknown_key",
            VerifyError::AlgorithmMismatch(_) => "algorithm_mismatch",
            VerifyError::InvalidSignature => "invalid_signature",
            VerifyError::ExpiredToken => "expired",
            VerifyError::TokenNotYetValid => "not_yet_valid",
            VerifyError::InvalidIssuer => "invalid_issuer",
        }
    }
}

impl RefreshError {
    /// Stage this failure belongs to.
    #[must_use]
    pub fn stage(&self) -> FailureStage {
        match self {
            RefreshError::Fetch(_) => FailureStage::Fetch,
            RefreshError::Parse(_) => FailureStage::Parse,
        }
    }
}

impl AuthError {
    /// Stage that failed, for observability.
    ///
    /// A malformed key-set document and a malformed token both report
    /// [`FailureStage::Parse`]; match on the variant to tell them apart.
    #[must_use]
    pub fn stage(&self) -> FailureStage {
        match self {
            AuthError::Config(_) => FailureStage::Config,
            AuthError::Refresh(e) => e.stage(),
            AuthError::Verify(e) => e.stage(),
            AuthError::Api(_) => FailureStage::Api,
        }
    }

    /// The verification failure, if this is one.
    #[must_use]
    pub fn as_verify(&self) -> Option<&VerifyError> {
        match self {
            AuthError::Verify(e) => Some(e),
            _ => None,
        }
    }
}
