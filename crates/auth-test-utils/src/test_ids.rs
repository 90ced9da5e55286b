//! Fixed identifiers for deterministic tests.

// Key IDs
pub const TEST_KID_1: &str = "k1";
pub const TEST_KID_2: &str = "k2";
pub const TEST_KID_EC: &str = "ec-2025-01";
pub const TEST_KID_ED: &str = "ed-2025-01";

// Token claims
pub const TEST_ISSUER: &str = "https://issuer";
pub const TEST_SUBJECT: &str = "user-42";
pub const TEST_EMAIL: &str = "user42@example.com";

// API credentials
pub const TEST_SECRET_KEY: &str = "sk-test-do-not-use-in-production";
pub const TEST_USER_ID: &str = "user-42";
