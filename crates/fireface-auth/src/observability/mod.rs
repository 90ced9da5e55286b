//! Observability for the auth client.
//!
//! The SDK only emits through the `metrics` facade; installing an exporter
//! is left to the host application. Without a recorder every call is a no-op.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `fireface_jwks_refresh_total` | Counter | `status`, `trigger` | Key-set fetch attempts |
//! | `fireface_jwks_refresh_duration_seconds` | Histogram | `status` | Key-set fetch latency |
//! | `fireface_jwks_keys` | Gauge | none | Keys in the current snapshot |
//! | `fireface_token_verifications_total` | Counter | `outcome` | Verification results |
//! | `fireface_token_verification_duration_seconds` | Histogram | `outcome` | Verification latency |

pub mod metrics;

pub use metrics::{record_jwks_refresh, record_token_verification, set_jwks_keys, RefreshTrigger};
