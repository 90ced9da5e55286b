//! SDK application handle.

use crate::config::AppConfig;
use crate::logging::{init_logging, LogSettings};
use crate::VERSION;
use fireface_auth::{AuthClient, AuthConfig, AuthError};

/// Entry point to the Fireface SDK.
#[derive(Debug, Clone)]
pub struct App {
    config: AppConfig,
}

impl App {
    /// Create an app, installing default logging if none exists.
    ///
    /// `None` uses [`AppConfig::default`].
    #[must_use]
    pub fn new(config: Option<AppConfig>) -> Self {
        Self::with_log_settings(config, LogSettings::from_env())
    }

    /// [`App::new`] with explicit log settings instead of `FIREFACE_DEBUG`.
    #[must_use]
    pub fn with_log_settings(config: Option<AppConfig>, log_settings: LogSettings) -> Self {
        init_logging(log_settings);
        let config = config.unwrap_or_default();

        tracing::debug!(target: "fireface.app", server_url = %config.server_url, "Fireface app created");

        Self { config }
    }

    #[must_use]
    pub fn server_url(&self) -> &str {
        &self.config.server_url
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Auth client configuration derived from this app.
    #[must_use]
    pub fn auth_config(&self) -> AuthConfig {
        let config = AuthConfig::new(self.config.server_url.clone(), self.config.secret_key.clone())
            .with_version(VERSION);
        match self.config.jwks_min_refresh_interval {
            Some(interval) => config.with_min_refresh_interval(interval),
            None => config,
        }
    }

    /// Build an auth client and fetch the server's keys.
    ///
    /// # Errors
    ///
    /// `AuthError::Config` for a missing secret key or bad URL, otherwise
    /// the initial key-set fetch error.
    pub async fn auth(&self) -> Result<AuthClient, AuthError> {
        AuthClient::connect(self.auth_config()).await
    }
}
