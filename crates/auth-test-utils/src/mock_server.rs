//! Mock Fireface endpoints backed by wiremock.
//!
//! Only the routes the SDK calls are modelled: the JWKS document and the
//! user update endpoint.

use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path of the key-set document.
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// JWKS document containing `keys`.
pub fn jwks_body(keys: &[Value]) -> Value {
    json!({ "keys": keys })
}

/// Start a server that answers the JWKS path with `keys`.
pub async fn start_jwks_server(keys: Vec<Value>) -> MockServer {
    let server = MockServer::start().await;
    mount_jwks(&server, &keys).await;
    server
}

/// Mount a JWKS response on an existing server.
pub async fn mount_jwks(server: &MockServer, keys: &[Value]) {
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks_body(keys)))
        .mount(server)
        .await;
}

/// Drop every mock and serve `keys` instead, simulating key rotation.
pub async fn rotate_jwks(server: &MockServer, keys: &[Value]) {
    server.reset().await;
    mount_jwks(server, keys).await;
}

/// Drop every mock and answer the JWKS path with `status`.
pub async fn fail_jwks(server: &MockServer, status: u16) {
    server.reset().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Number of JWKS requests the server has seen.
pub async fn jwks_request_count(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == JWKS_PATH)
        .count()
}

/// User record as returned by the update endpoint.
pub fn user_json(id: &str, email: &str, created_at: i64, updated_at: i64) -> Value {
    json!({
        "id": id,
        "email": email,
        "created_at": created_at,
        "updated_at": updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_jwks_server_serves_keys() {
        let server = start_jwks_server(vec![json!({"kid": "a"})]).await;

        let body: Value = reqwest::get(format!("{}{}", server.uri(), JWKS_PATH))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["keys"][0]["kid"], "a");
        assert_eq!(jwks_request_count(&server).await, 1);
    }

    #[tokio::test]
    async fn test_fail_jwks() {
        let server = start_jwks_server(vec![]).await;
        fail_jwks(&server, 503).await;

        let status = reqwest::get(format!("{}{}", server.uri(), JWKS_PATH))
            .await
            .unwrap()
            .status();
        assert_eq!(status.as_u16(), 503);
    }
}
