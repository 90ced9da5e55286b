//! Fireface auth client library.
//!
//! Verifies ID tokens issued by a Fireface server against the server's
//! published JSON Web Key Set, and calls the Fireface user API.
//!
//! # Architecture
//!
//! ```text
//! client.rs -> key_cache.rs -> jwks.rs (fetch + parse)
//!           -> jwt.rs (verify against a KeySet snapshot)
//!           -> users.rs (user API)
//! ```
//!
//! # Modules
//!
//! - `client` - `AuthClient`, the entry point
//! - `config` - Client configuration and validation
//! - `errors` - Error types, grouped by failure stage
//! - `jwks` - Key-set fetching and parsing
//! - `key_cache` - Stale-tolerant, single-flight key-set cache
//! - `jwt` - Token verification
//! - `claims` - Token claim types
//! - `users` - User API types and calls
//! - `observability` - Metrics
//!
//! # Example
//!
//! ```rust,ignore
//! use common::secret::SecretString;
//! use fireface_auth::{AuthClient, AuthConfig};
//!
//! let config = AuthConfig::new("https://fireface.example", SecretString::from(secret));
//! let client = AuthClient::connect(config).await?;
//! let token = client.verify_id_token(&id_token).await?;
//! println!("verified user {}", token.sub);
//! ```

pub mod claims;
pub mod client;
pub mod config;
pub mod errors;
pub mod jwks;
pub mod jwt;
pub mod key_cache;
pub mod observability;
pub mod users;

pub use claims::DecodedIdToken;
pub use client::AuthClient;
pub use config::{AuthConfig, ConfigError, InvalidKeyPolicy, UnknownKeyPolicy};
pub use errors::{
    ApiError, AuthError, FailureStage, FetchError, ParseError, RefreshError, VerifyError,
};
pub use jwks::{KeySet, KeySetSource, VerificationKey};
pub use users::{User, UserUpdate};
