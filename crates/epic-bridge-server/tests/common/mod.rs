#![allow(dead_code)]

use std::time::Duration;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Request, StatusCode};
use epic_bridge_auth::SigningCredential;
use epic_bridge_server::config::AppConfig;
use epic_bridge_server::{AppState, build_app};
use serde_json::Value;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const PRIVATE_KEY: &str =
    include_str!("../../../epic-bridge-auth/tests/fixtures/private_key.pem");

pub const TOKEN_PATH: &str = "/oauth2/token";
pub const R4: &str = "/api/FHIR/R4";
pub const STU3: &str = "/api/FHIR/STU3";

/// A router wired to a mock standing in for both Epic's token endpoint and
/// its FHIR server.
pub struct TestContext {
    pub epic: MockServer,
    pub app: Router,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

pub fn config_for(epic: &MockServer) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.epic.client_id = "client-123".into();
    cfg.epic.token_url = format!("{}{TOKEN_PATH}", epic.uri());
    cfg.epic.fhir_r4_base = format!("{}{R4}/", epic.uri());
    cfg.epic.fhir_stu3_base = format!("{}{STU3}/", epic.uri());
    cfg.epic.request_timeout = Duration::from_secs(5);
    cfg
}

pub fn credential() -> SigningCredential {
    SigningCredential::from_pem("client-123", PRIVATE_KEY).unwrap()
}

pub async fn setup() -> TestContext {
    setup_with(|_| {}).await
}

pub async fn setup_with(customize: impl FnOnce(&mut AppConfig)) -> TestContext {
    let epic = MockServer::start().await;
    let mut cfg = config_for(&epic);
    customize(&mut cfg);
    let state = AppState::with_credential(cfg, credential()).unwrap();
    TestContext {
        epic,
        app: build_app(state),
    }
}

impl TestContext {
    /// Token endpoint answering `{"access_token": "T"}`.
    pub async fn mount_token(&self) {
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "T",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .mount(&self.epic)
            .await;
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.epic.uri())
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post_json(&self, uri: &str, body: &Value) -> TestResponse {
        self.send(
            Request::post(uri)
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(body).unwrap()))
                .unwrap(),
        )
        .await
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// Requests that reached the mock, excluding token exchanges.
    pub async fn fhir_requests(&self) -> Vec<wiremock::Request> {
        self.epic
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path() != TOKEN_PATH)
            .collect()
    }
}

/// Percent-encodes `value` for use as a query parameter.
pub fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
