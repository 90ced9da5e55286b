//! SDK configuration.
//!
//! Loaded programmatically or from environment variables. The secret key is
//! redacted in Debug output.

use common::secret::SecretString;
use fireface_auth::ConfigError;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;

/// Default Fireface server.
pub const DEFAULT_SERVER_URL: &str = "https://fireface.4armedlabs.run";

pub const ENV_SERVER_URL: &str = "FIREFACE_SERVER_URL";
pub const ENV_SECRET_KEY: &str = "FIREFACE_SECRET_KEY";
pub const ENV_JWKS_MIN_REFRESH_SECONDS: &str = "FIREFACE_JWKS_MIN_REFRESH_SECONDS";

/// Application configuration.
#[derive(Clone)]
pub struct AppConfig {
    /// URL of the Fireface server.
    pub server_url: String,

    /// Server secret key. Required by [`App::auth`](crate::App::auth).
    pub secret_key: SecretString,

    /// Overrides the auth client's minimum key-set refresh interval.
    pub jwks_min_refresh_interval: Option<Duration>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            secret_key: SecretString::from(""),
            jwks_min_refresh_interval: None,
        }
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("server_url", &self.server_url)
            .field("secret_key", &"[REDACTED]")
            .field("jwks_min_refresh_interval", &self.jwks_min_refresh_interval)
            .finish()
    }
}

impl AppConfig {
    /// Default server with the given secret key.
    #[must_use]
    pub fn with_secret_key(secret_key: SecretString) -> Self {
        Self {
            secret_key,
            ..Self::default()
        }
    }

    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// See [`AppConfig::from_vars`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// Unset variables fall back to defaults; the secret key is checked when
    /// the auth client is built.
    ///
    /// # Errors
    ///
    /// `ConfigError::InvalidEnvVar` if the refresh interval is not a
    /// positive integer.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let server_url = vars
            .get(ENV_SERVER_URL)
            .filter(|v| !v.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());

        let secret_key = SecretString::from(vars.get(ENV_SECRET_KEY).cloned().unwrap_or_default());

        let jwks_min_refresh_interval = match vars.get(ENV_JWKS_MIN_REFRESH_SECONDS) {
            None => None,
            Some(value_str) => {
                let value: u64 = value_str.trim().parse().map_err(|e| ConfigError::InvalidEnvVar {
                    name: ENV_JWKS_MIN_REFRESH_SECONDS.to_string(),
                    reason: format!("must be a positive integer, got '{value_str}': {e}"),
                })?;
                if value == 0 {
                    return Err(ConfigError::InvalidEnvVar {
                        name: ENV_JWKS_MIN_REFRESH_SECONDS.to_string(),
                        reason: "must be greater than 0".to_string(),
                    });
                }
                Some(Duration::from_secs(value))
            }
        };

        Ok(Self {
            server_url,
            secret_key,
            jwks_min_refresh_interval,
        })
    }
}
