//! User management API.
//!
//! Calls `PUT {base_url}/auth/users/{id}` authenticated with the server
//! secret key as a bearer token.

use crate::errors::ApiError;
use chrono::{DateTime, Utc};
use common::secret::{serialize_exposed_opt, ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, instrument, warn};

/// Longest error body kept in [`ApiError::Status`].
const MAX_ERROR_BODY_CHARS: usize = 512;

/// A Fireface user as returned by the API.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct User {
    pub id: String,

    /// Redacted in Debug output.
    pub email: String,

    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "chrono::serde::ts_seconds")]
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &"[REDACTED]")
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Fields to change on a user. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UserUpdate {
    #[serde(
        serialize_with = "serialize_exposed_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub password: Option<SecretString>,
}

impl UserUpdate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_password(mut self, password: SecretString) -> Self {
        self.password = Some(password);
        self
    }
}

/// Thin client for the user endpoints.
pub(crate) struct UsersApi {
    base_url: String,
    http_client: reqwest::Client,
    secret_key: SecretString,
}

impl UsersApi {
    pub(crate) fn new(base_url: String, http_client: reqwest::Client, secret_key: SecretString) -> Self {
        Self {
            base_url,
            http_client,
            secret_key,
        }
    }

    /// `{base_url}/auth/users/{id}` with `id` percent-encoded as one segment.
    pub(crate) fn user_url(&self, id: &str) -> Result<reqwest::Url, ApiError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| ApiError::Request(format!("invalid base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| ApiError::Request("base URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(["auth", "users", id]);
        Ok(url)
    }

    #[instrument(skip_all)]
    pub(crate) async fn update_user(&self, id: &str, update: &UserUpdate) -> Result<User, ApiError> {
        if id.is_empty() {
            return Err(ApiError::Request("user id is required".to_string()));
        }
        let url = self.user_url(id)?;

        tracing::debug!(target: "fireface.auth.users", user_id = %id, "Updating user");

        let response = self
            .http_client
            .put(url)
            .bearer_auth(self.secret_key.expose_secret())
            .json(update)
            .send()
            .await
            .map_err(|e| {
                error!(target: "fireface.auth.users", error = %e, "User update request failed");
                ApiError::Request(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.is_server_error() {
                warn!(target: "fireface.auth.users", status = %status, "User API returned server error");
            } else {
                warn!(target: "fireface.auth.users", status = %status, "User API rejected request");
            }
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY_CHARS),
            });
        }

        let user: User = response.json().await.map_err(|e| {
            error!(target: "fireface.auth.users", error = %e, "Failed to parse user response");
            ApiError::InvalidBody(e.to_string())
        })?;

        tracing::info!(target: "fireface.auth.users", user_id = %user.id, "User updated");
        Ok(user)
    }
}

fn truncate(body: &str, max_chars: usize) -> String {
    body.chars().take(max_chars).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn api(base_url: &str) -> UsersApi {
        UsersApi::new(
            base_url.to_string(),
            reqwest::Client::new(),
            SecretString::from("sk_test"),
        )
    }

    #[test]
    fn test_user_update_serialization() {
        let update = UserUpdate::new().with_password(SecretString::from("n3w-pass"));
        assert_eq!(
            serde_json::to_string(&update).unwrap(),
            r#"{"password":"n3w-pass"}"#
        );
        assert_eq!(serde_json::to_string(&UserUpdate::new()).unwrap(), "{}");
    }

    #[test]
    fn test_user_update_debug_redacts_password() {
        let update = UserUpdate::new().with_password(SecretString::from("n3w-pass"));
        assert!(!format!("{update:?}").contains("n3w-pass"));
    }

    #[test]
    fn test_user_deserialization() {
        let user: User = serde_json::from_str(
            r#"{"id":"u1","email":"a@example.com","created_at":1700000000,"updated_at":1700000100}"#,
        )
        .unwrap();

        assert_eq!(user.id, "u1");
        assert_eq!(user.created_at.timestamp(), 1_700_000_000);
        assert_eq!(user.updated_at.timestamp(), 1_700_000_100);
        assert!(!format!("{user:?}").contains("a@example.com"));
    }

    #[test]
    fn test_user_url() {
        assert_eq!(
            api("https://fireface.example").user_url("u1").unwrap().as_str(),
            "https://fireface.example/auth/users/u1"
        );
        assert_eq!(
            api("https://fireface.example/tenant").user_url("a/b c").unwrap().as_str(),
            "https://fireface.example/tenant/auth/users/a%2Fb%20c"
        );
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abcdef", 3), "abc");
        assert_eq!(truncate("äöü", 2), "äö");
        assert_eq!(truncate("", 3), "");
    }
}
