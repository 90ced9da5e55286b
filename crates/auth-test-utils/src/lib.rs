//! # Auth Test Utilities
//!
//! Shared test utilities for the Fireface auth client.
//!
//! This crate provides:
//! - Deterministic key fixtures (fixed RSA/EC keys, seeded Ed25519 keys)
//! - Token builders (`TestTokenBuilder`) and signing helpers
//! - Mock JWKS and user API servers backed by wiremock
//! - Fixed test identifiers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use auth_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let keypair = TestKeypair::rsa(&RSA_KEY_1, "k1");
//!     let server = start_jwks_server(vec![keypair.jwk_json()]).await;
//!
//!     let token = keypair.sign(
//!         &TestTokenBuilder::new()
//!             .for_user("user-42")
//!             .issued_by("https://issuer")
//!             .build(),
//!     );
//! }
//! ```

pub mod crypto_fixtures;
pub mod mock_server;
pub mod test_ids;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use mock_server::*;
pub use test_ids::*;
pub use token_builders::*;
