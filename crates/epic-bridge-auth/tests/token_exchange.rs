//! Token exchange against a mocked authorization server.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use epic_bridge_auth::{
    AuthError, CLIENT_ASSERTION_TYPE, ClientAssertionClaims, SigningCredential, TokenClientConfig,
    TokenExchangeClient, TokenSource,
};
use jsonwebtoken::{Algorithm, Validation};
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PRIVATE_KEY: &str = include_str!("fixtures/private_key.pem");

fn credential() -> Arc<SigningCredential> {
    Arc::new(SigningCredential::from_pem("client-123", PRIVATE_KEY).unwrap())
}

fn client(server: &MockServer) -> TokenExchangeClient {
    let endpoint = Url::parse(&format!("{}/oauth2/token", server.uri())).unwrap();
    let config = TokenClientConfig::new(endpoint).with_request_timeout(Duration::from_secs(5));
    TokenExchangeClient::new(config, credential()).unwrap()
}

fn form_of(request: &wiremock::Request) -> HashMap<String, String> {
    url::form_urlencoded::parse(&request.body)
        .into_owned()
        .collect()
}

#[tokio::test]
async fn exchange_returns_access_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "T",
            "token_type": "Bearer",
            "expires_in": 3600,
            "scope": "system/Patient.read"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let token = client(&server).exchange().await.unwrap();
    assert_eq!(token.secret(), "T");
    assert_eq!(token.expires_in, Some(3600));
}

#[tokio::test]
async fn exchange_sends_jwt_bearer_form() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "T"
        })))
        .mount(&server)
        .await;

    let client = client(&server);
    client.exchange().await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let form = form_of(&requests[0]);

    assert_eq!(form["grant_type"], "client_credentials");
    assert_eq!(form["client_assertion_type"], CLIENT_ASSERTION_TYPE);

    // The assertion targets the token endpoint and verifies with our key.
    let credential = credential();
    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[client.token_endpoint().as_str()]);
    validation.set_issuer(&["client-123"]);
    let claims = jsonwebtoken::decode::<ClientAssertionClaims>(
        &form["client_assertion"],
        &credential.decoding_key().unwrap(),
        &validation,
    )
    .unwrap()
    .claims;
    assert_eq!(claims.sub, "client-123");
    assert_eq!(claims.exp - claims.iat, 300);
}

#[tokio::test]
async fn each_exchange_uses_fresh_assertion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "T"
        })))
        .expect(2)
        .mount(&server)
        .await;

    let client = client(&server);
    client.access_token().await.unwrap();
    client.access_token().await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let first = form_of(&requests[0]);
    let second = form_of(&requests[1]);
    assert_ne!(first["client_assertion"], second["client_assertion"]);
}

#[tokio::test]
async fn unauthorized_is_token_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(
            ResponseTemplate::new(401).set_body_string(r#"{"error":"invalid_client"}"#),
        )
        .mount(&server)
        .await;

    let err = client(&server).exchange().await.unwrap_err();
    match err {
        AuthError::TokenRejected { status, ref body } => {
            assert_eq!(status, 401);
            assert_eq!(body, r#"{"error":"invalid_client"}"#);
        }
        other => panic!("expected TokenRejected, got {other:?}"),
    }
    assert!(err.is_token_exchange_failure());
}

#[tokio::test]
async fn body_without_access_token_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "token_type": "Bearer"
        })))
        .mount(&server)
        .await;

    let err = client(&server).exchange().await.unwrap_err();
    assert!(matches!(err, AuthError::MissingAccessToken { .. }));
}

#[tokio::test]
async fn unreachable_endpoint_is_network_error() {
    let server = MockServer::start().await;
    let endpoint = Url::parse(&format!("{}/oauth2/token", server.uri())).unwrap();
    drop(server);

    let config = TokenClientConfig::new(endpoint).with_request_timeout(Duration::from_secs(2));
    let client = TokenExchangeClient::new(config, credential()).unwrap();

    let err = client.exchange().await.unwrap_err();
    assert!(matches!(err, AuthError::Network(_)));
}
