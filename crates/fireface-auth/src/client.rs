//! Fireface auth client.
//!
//! [`AuthClient`] owns one [`KeyCache`] and exposes ID token verification
//! and the user API. Construction is two-phase: [`AuthClient::new`] only
//! validates configuration, [`AuthClient::warm_up`] performs the first key
//! fetch. [`AuthClient::connect`] does both.

use crate::claims::DecodedIdToken;
use crate::config::{AuthConfig, ConfigError, UnknownKeyPolicy, DEFAULT_CONNECT_TIMEOUT};
use crate::errors::{AuthError, FetchError, VerifyError};
use crate::jwks::{JwksFetcher, KeySet, KeySetSource};
use crate::jwt::{verify_at, VerifyOptions};
use crate::key_cache::KeyCache;
use crate::observability::metrics::record_token_verification;
use crate::users::{User, UserUpdate, UsersApi};
use chrono::Utc;
use common::jwt::{decode_header, split_token};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Verifies Fireface ID tokens and calls the Fireface user API.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct AuthClient {
    config: AuthConfig,
    jwks_url: String,
    cache: KeyCache,
    users: UsersApi,
    verify_options: VerifyOptions,
}

impl fmt::Debug for AuthClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthClient")
            .field("jwks_url", &self.jwks_url)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AuthClient {
    /// Validate `config` and build the client. No network I/O.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Config` for an empty secret key, a missing or
    /// invalid base URL, out-of-range settings, or an HTTP client that
    /// cannot be built.
    pub fn new(config: AuthConfig) -> Result<Self, AuthError> {
        config.validate()?;
        let http_client = build_http_client(&config)?;
        let source = Arc::new(JwksFetcher::new(
            config.jwks_url(),
            http_client.clone(),
            config.invalid_key_policy,
        ));
        Ok(Self::assemble(config, source, http_client))
    }

    /// Like [`AuthClient::new`], but keys come from `source`.
    ///
    /// # Errors
    ///
    /// Same as [`AuthClient::new`].
    pub fn with_source(
        config: AuthConfig,
        source: Arc<dyn KeySetSource>,
    ) -> Result<Self, AuthError> {
        config.validate()?;
        let http_client = build_http_client(&config)?;
        Ok(Self::assemble(config, source, http_client))
    }

    /// Build the client and fetch the key set once.
    ///
    /// # Errors
    ///
    /// Configuration errors, or the refresh error when the initial fetch
    /// fails.
    pub async fn connect(config: AuthConfig) -> Result<Self, AuthError> {
        let client = Self::new(config)?;
        client.warm_up().await?;
        Ok(client)
    }

    fn assemble(
        config: AuthConfig,
        source: Arc<dyn KeySetSource>,
        http_client: reqwest::Client,
    ) -> Self {
        let jwks_url = source.endpoint().to_string();
        let cache = KeyCache::new(source, config.min_refresh_interval, config.refresh_cooldown);
        let users = UsersApi::new(
            config.base_url().to_string(),
            http_client,
            config.secret_key.clone(),
        );
        let verify_options = VerifyOptions::from(&config);

        tracing::debug!(target: "fireface.auth.client", jwks_url = %jwks_url, "Auth client created");

        Self {
            config,
            jwks_url,
            cache,
            users,
            verify_options,
        }
    }

    /// Fetch the key set, bounded by `initial_fetch_timeout`.
    ///
    /// # Errors
    ///
    /// `FetchError::Timeout` when the bound is hit, otherwise the refresh
    /// error.
    pub async fn warm_up(&self) -> Result<(), AuthError> {
        self.warm_up_with_cancel(&CancellationToken::new()).await
    }

    /// [`AuthClient::warm_up`] that also stops when `cancel` fires.
    ///
    /// # Errors
    ///
    /// As [`AuthClient::warm_up`], plus `FetchError::Cancelled`.
    #[instrument(skip_all, fields(jwks_url = %self.jwks_url))]
    pub async fn warm_up_with_cancel(&self, cancel: &CancellationToken) -> Result<(), AuthError> {
        let fetch = tokio::time::timeout(
            self.config.initial_fetch_timeout,
            self.cache.warm_up_at(Instant::now()),
        );

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(AuthError::from(FetchError::Cancelled)),
            outcome = fetch => match outcome {
                Ok(Ok(_)) => Ok(()),
                Ok(Err(e)) => Err(AuthError::from(e)),
                Err(_) => Err(AuthError::from(FetchError::Timeout)),
            },
        };

        if let Err(e) = &result {
            tracing::error!(
                target: "fireface.auth.client",
                jwks_url = %self.jwks_url,
                stage = e.stage().as_str(),
                error = %e,
                "Initial key set fetch failed"
            );
        }
        result
    }

    /// Verify a Fireface ID token and return its claims.
    ///
    /// Refreshes the key set first when it is older than the minimum refresh
    /// interval. Under [`UnknownKeyPolicy::RefreshOnce`] a token signed with
    /// an unknown key triggers one forced refresh and a second attempt.
    ///
    /// # Errors
    ///
    /// `AuthError::Verify` for token problems, `AuthError::Refresh` when no
    /// key set could ever be fetched.
    #[instrument(skip_all)]
    pub async fn verify_id_token(&self, token: &str) -> Result<DecodedIdToken, AuthError> {
        let started = Instant::now();
        let result = self.verify_with(token, started).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(AuthError::Verify(e)) => e.outcome_label(),
            Err(_) => "key_set_unavailable",
        };
        record_token_verification(outcome, started.elapsed());

        if let Err(e) = &result {
            let key_count = self.cache.snapshot().await.map_or(0, |s| s.len());
            tracing::warn!(
                target: "fireface.auth.client",
                stage = e.stage().as_str(),
                kid = token_kid(token).as_deref(),
                key_count,
                error = %e,
                "ID token verification failed"
            );
            tracing::debug!(target: "fireface.auth.client", token_size = token.len(), "Rejected token size");
        }
        result
    }

    async fn verify_with(&self, token: &str, now: Instant) -> Result<DecodedIdToken, AuthError> {
        let key_set = self.cache.ensure_fresh_at(now).await?;

        match verify_at(token, &key_set, Utc::now().timestamp(), &self.verify_options) {
            Err(VerifyError::UnknownKey(kid))
                if self.config.unknown_key_policy == UnknownKeyPolicy::RefreshOnce =>
            {
                tracing::info!(
                    target: "fireface.auth.client",
                    kid = %kid,
                    key_count = key_set.len(),
                    "Unknown key id, refreshing key set"
                );

                let Ok(refreshed) = self.cache.force_refresh_at(Instant::now()).await else {
                    return Err(VerifyError::UnknownKey(kid).into());
                };
                verify_at(token, &refreshed, Utc::now().timestamp(), &self.verify_options)
                    .map_err(Into::into)
            }
            other => other.map_err(Into::into),
        }
    }

    /// Update a user through `PUT {base_url}/auth/users/{id}`.
    ///
    /// # Errors
    ///
    /// `AuthError::Api` with the status, transport, or decoding failure.
    pub async fn update_user(&self, id: &str, update: &UserUpdate) -> Result<User, AuthError> {
        self.users.update_user(id, update).await.map_err(Into::into)
    }

    /// `{base_url}/.well-known/jwks.json`.
    #[must_use]
    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// Current key set, if one has been fetched.
    pub async fn key_set(&self) -> Option<Arc<KeySet>> {
        self.cache.snapshot().await
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }
}

/// Header `kid`, when the token gets that far.
fn token_kid(token: &str) -> Option<String> {
    split_token(token)
        .and_then(|parts| decode_header(&parts))
        .ok()
        .map(|header| header.kid)
}

fn build_http_client(config: &AuthConfig) -> Result<reqwest::Client, ConfigError> {
    reqwest::Client::builder()
        .timeout(config.http_timeout)
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT.min(config.http_timeout))
        .user_agent(config.user_agent())
        .build()
        .map_err(|e| {
            tracing::error!(target: "fireface.auth.client", error = %e, "Failed to build HTTP client");
            ConfigError::HttpClient(e.to_string())
        })
}
