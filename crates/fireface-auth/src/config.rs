//! Auth client configuration.
//!
//! `AuthConfig` is immutable once handed to the client. Defaults are applied
//! by [`AuthConfig::new`]; `with_*` methods override them. The secret key is
//! redacted in Debug output.

use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use common::secret::{ExposeSecret, SecretString};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Path of the key-set document below the base URL.
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// Default minimum interval between scheduled key-set refreshes (5 minutes).
pub const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(300);

/// Default minimum gap between two fetch attempts (30 seconds).
///
/// Bounds how often a failing endpoint or a stream of unknown `kid`s can
/// cause network traffic.
pub const DEFAULT_REFRESH_COOLDOWN: Duration = Duration::from_secs(30);

/// Default HTTP request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default connection timeout for the HTTP client.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on the warm-up fetch.
pub const DEFAULT_INITIAL_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// What to do when a token names a `kid` the cache does not hold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnknownKeyPolicy {
    /// Force one refresh (subject to the cooldown) and verify again.
    #[default]
    RefreshOnce,
    /// Fail immediately with `UnknownKey`.
    FailFast,
}

/// What to do with an individual key the client cannot use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InvalidKeyPolicy {
    /// Log and drop the key; keep the rest of the document.
    #[default]
    Skip,
    /// Reject the whole document.
    Reject,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Secret key is required")]
    MissingSecretKey,

    #[error("Base URL is required")]
    MissingBaseUrl,

    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("Invalid clock skew configuration: {0}")]
    InvalidClockSkew(String),

    #[error("Invalid refresh interval configuration: {0}")]
    InvalidRefreshInterval(String),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error("Invalid value for environment variable {name}: {reason}")]
    InvalidEnvVar { name: String, reason: String },
}

/// Construction-time parameters for [`AuthClient`](crate::client::AuthClient).
#[derive(Clone)]
pub struct AuthConfig {
    /// Fireface server base URL (e.g., `https://fireface.example`).
    pub base_url: String,

    /// Server secret key, used to authenticate API calls.
    pub secret_key: SecretString,

    /// Key-set age after which the next verification triggers a refresh.
    pub min_refresh_interval: Duration,

    /// Minimum gap between fetch attempts after the first one.
    pub refresh_cooldown: Duration,

    /// HTTP request timeout.
    pub http_timeout: Duration,

    /// Bound on the warm-up fetch.
    pub initial_fetch_timeout: Duration,

    /// Tolerance for `iat`/`nbf` in the future.
    pub clock_skew: Duration,

    pub unknown_key_policy: UnknownKeyPolicy,

    pub invalid_key_policy: InvalidKeyPolicy,

    /// When set, tokens with a different `iss` are rejected.
    pub expected_issuer: Option<String>,

    /// SDK version, sent in the `User-Agent` header.
    pub version: String,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("base_url", &self.base_url)
            .field("secret_key", &"[REDACTED]")
            .field("min_refresh_interval", &self.min_refresh_interval)
            .field("refresh_cooldown", &self.refresh_cooldown)
            .field("http_timeout", &self.http_timeout)
            .field("initial_fetch_timeout", &self.initial_fetch_timeout)
            .field("clock_skew", &self.clock_skew)
            .field("unknown_key_policy", &self.unknown_key_policy)
            .field("invalid_key_policy", &self.invalid_key_policy)
            .field("expected_issuer", &self.expected_issuer)
            .field("version", &self.version)
            .finish()
    }
}

impl AuthConfig {
    /// Create a configuration with default timeouts and policies.
    ///
    /// Nothing is validated here; [`AuthConfig::validate`] runs when the
    /// client is built.
    #[must_use]
    pub fn new(base_url: impl Into<String>, secret_key: SecretString) -> Self {
        Self {
            base_url: base_url.into(),
            secret_key,
            min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
            refresh_cooldown: DEFAULT_REFRESH_COOLDOWN,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            initial_fetch_timeout: DEFAULT_INITIAL_FETCH_TIMEOUT,
            clock_skew: DEFAULT_CLOCK_SKEW,
            unknown_key_policy: UnknownKeyPolicy::default(),
            invalid_key_policy: InvalidKeyPolicy::default(),
            expected_issuer: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    #[must_use]
    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    #[must_use]
    pub fn with_refresh_cooldown(mut self, cooldown: Duration) -> Self {
        self.refresh_cooldown = cooldown;
        self
    }

    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_initial_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.initial_fetch_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew;
        self
    }

    #[must_use]
    pub fn with_unknown_key_policy(mut self, policy: UnknownKeyPolicy) -> Self {
        self.unknown_key_policy = policy;
        self
    }

    #[must_use]
    pub fn with_invalid_key_policy(mut self, policy: InvalidKeyPolicy) -> Self {
        self.invalid_key_policy = policy;
        self
    }

    #[must_use]
    pub fn with_expected_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.expected_issuer = Some(issuer.into());
        self
    }

    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Apply an arbitrary override after defaults.
    ///
    /// ```rust,ignore
    /// let config = AuthConfig::new(url, secret).with(|c| c.http_timeout = Duration::from_secs(2));
    /// ```
    #[must_use]
    pub fn with(mut self, option: impl FnOnce(&mut Self)) -> Self {
        option(&mut self);
        self
    }

    /// Base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// `{base_url}/.well-known/jwks.json`.
    #[must_use]
    pub fn jwks_url(&self) -> String {
        format!("{}{JWKS_PATH}", self.base_url())
    }

    /// `User-Agent` value for outbound requests.
    #[must_use]
    pub fn user_agent(&self) -> String {
        format!("fireface-sdk-rust/{}", self.version)
    }

    /// Check every field; called by the client constructor.
    ///
    /// # Errors
    ///
    /// - `MissingSecretKey` / `MissingBaseUrl` for empty values
    /// - `InvalidBaseUrl` unless the URL parses with an `http`/`https` scheme
    /// - `InvalidRefreshInterval` for a zero refresh interval
    /// - `InvalidClockSkew` above [`MAX_CLOCK_SKEW`]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret_key.expose_secret().trim().is_empty() {
            return Err(ConfigError::MissingSecretKey);
        }

        if self.base_url.trim().is_empty() {
            return Err(ConfigError::MissingBaseUrl);
        }

        let url = reqwest::Url::parse(self.base_url())
            .map_err(|e| ConfigError::InvalidBaseUrl(format!("'{}': {e}", self.base_url)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidBaseUrl(format!(
                "scheme must be http or https, got '{}'",
                url.scheme()
            )));
        }
        if url.scheme() == "http" {
            tracing::warn!(
                target: "fireface.auth.config",
                base_url = %self.base_url,
                "Base URL does not use HTTPS; use HTTPS in production"
            );
        }

        if self.min_refresh_interval.is_zero() {
            return Err(ConfigError::InvalidRefreshInterval(
                "min_refresh_interval must be greater than 0".to_string(),
            ));
        }

        if self.clock_skew > MAX_CLOCK_SKEW {
            return Err(ConfigError::InvalidClockSkew(format!(
                "clock skew must not exceed {} seconds, got {}",
                MAX_CLOCK_SKEW.as_secs(),
                self.clock_skew.as_secs()
            )));
        }

        Ok(())
    }
}
