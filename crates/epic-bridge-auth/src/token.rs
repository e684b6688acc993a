//! Token exchange against the authorization server.
//!
//! The [`TokenExchangeClient`] trades a freshly signed client assertion for a
//! bearer access token using the OAuth 2.0 client-credentials grant with a
//! JWT-bearer client assertion (SMART Backend Services).
//!
//! ```text
//! POST {token_endpoint}
//! Content-Type: application/x-www-form-urlencoded
//!
//! grant_type=client_credentials
//! &client_assertion_type=urn:ietf:params:oauth:client-assertion-type:jwt-bearer
//! &client_assertion=<signed JWT>
//! ```
//!
//! There is no retry. A failed exchange is final for the request that
//! triggered it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::instrument;
use url::Url;

use crate::AuthResult;
use crate::assertion::{AssertionBuilder, CLIENT_ASSERTION_TYPE};
use crate::credential::SigningCredential;
use crate::error::AuthError;

/// Grant type sent to the token endpoint.
pub const GRANT_TYPE: &str = "client_credentials";

/// Bearer access token returned by the authorization server.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct AccessToken {
    /// The opaque bearer string.
    pub access_token: String,

    /// Token type, normally `Bearer`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    /// Lifetime in seconds, when the server reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,

    /// Granted scopes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl AccessToken {
    /// Creates a token with no metadata.
    #[must_use]
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: None,
            expires_in: None,
            scope: None,
        }
    }

    /// Sets the reported lifetime.
    #[must_use]
    pub fn with_expires_in(mut self, seconds: u64) -> Self {
        self.expires_in = Some(seconds);
        self
    }

    /// The bearer string to put in an `Authorization` header.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.access_token
    }

    /// Parses a token endpoint success body.
    ///
    /// Only `access_token` is required. The optional fields are read
    /// leniently so a server that reports `expires_in` as a string does not
    /// fail the exchange.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MalformedTokenResponse`] if the body is not JSON and
    /// [`AuthError::MissingAccessToken`] if `access_token` is absent, empty or
    /// not a string.
    pub fn from_response_body(body: &str) -> AuthResult<Self> {
        let value: Value = serde_json::from_str(body)
            .map_err(|e| AuthError::malformed_token_response(e.to_string(), body))?;

        let access_token = match value.get("access_token").and_then(Value::as_str) {
            Some(token) if !token.is_empty() => token.to_string(),
            _ => {
                return Err(AuthError::MissingAccessToken {
                    body: body.to_string(),
                });
            }
        };

        Ok(Self {
            access_token,
            token_type: value
                .get("token_type")
                .and_then(Value::as_str)
                .map(str::to_owned),
            expires_in: value.get("expires_in").and_then(|v| {
                v.as_u64()
                    .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
            }),
            scope: value.get("scope").and_then(Value::as_str).map(str::to_owned),
        })
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Anything that can hand out a bearer token for downstream calls.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Returns a token valid for at least one downstream call.
    async fn access_token(&self) -> AuthResult<AccessToken>;
}

#[async_trait]
impl<T: TokenSource + ?Sized> TokenSource for Arc<T> {
    async fn access_token(&self) -> AuthResult<AccessToken> {
        (**self).access_token().await
    }
}

/// Configuration for the token exchange client.
#[derive(Debug, Clone)]
pub struct TokenClientConfig {
    /// Authorization server token endpoint. Also the assertion audience.
    pub token_endpoint: Url,

    /// HTTP request timeout (default: 30 seconds).
    pub request_timeout: Duration,
}

impl TokenClientConfig {
    /// Creates a configuration for `token_endpoint` with default timeout.
    #[must_use]
    pub fn new(token_endpoint: Url) -> Self {
        Self {
            token_endpoint,
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Sets the HTTP request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Performs the client-credentials + JWT-bearer exchange.
pub struct TokenExchangeClient {
    http_client: reqwest::Client,
    token_endpoint: Url,
    assertions: AssertionBuilder,
    credential: Arc<SigningCredential>,
}

impl TokenExchangeClient {
    /// Creates a client with its own HTTP connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the HTTP client cannot be built.
    pub fn new(config: TokenClientConfig, credential: Arc<SigningCredential>) -> AuthResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AuthError::configuration(format!("cannot build HTTP client: {e}")))?;

        Ok(Self::with_http_client(
            http_client,
            config.token_endpoint,
            credential,
        ))
    }

    /// Creates a client that shares an existing HTTP client.
    #[must_use]
    pub fn with_http_client(
        http_client: reqwest::Client,
        token_endpoint: Url,
        credential: Arc<SigningCredential>,
    ) -> Self {
        Self {
            http_client,
            assertions: AssertionBuilder::new(token_endpoint.as_str()),
            token_endpoint,
            credential,
        }
    }

    /// Token endpoint this client posts to.
    #[must_use]
    pub fn token_endpoint(&self) -> &Url {
        &self.token_endpoint
    }

    /// Signs a new assertion and exchanges it for an access token.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Signing`] if the assertion cannot be signed
    /// - [`AuthError::Network`] if the token endpoint cannot be reached
    /// - [`AuthError::TokenRejected`] on any non-2xx status
    /// - [`AuthError::MalformedTokenResponse`] / [`AuthError::MissingAccessToken`]
    ///   if the success body carries no usable token
    #[instrument(skip(self), fields(token_endpoint = %self.token_endpoint, client_id = %self.credential.client_id()))]
    pub async fn exchange(&self) -> AuthResult<AccessToken> {
        let assertion = self.assertions.build(&self.credential)?;

        let params = [
            ("grant_type", GRANT_TYPE),
            ("client_assertion_type", CLIENT_ASSERTION_TYPE),
            ("client_assertion", assertion.as_str()),
        ];

        let response = self
            .http_client
            .post(self.token_endpoint.as_str())
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Token endpoint request failed");
                AuthError::Network(e)
            })?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Token endpoint rejected assertion");
            return Err(AuthError::TokenRejected {
                status: status.as_u16(),
                body,
            });
        }

        let token = AccessToken::from_response_body(&body)?;
        tracing::debug!(
            expires_in = ?token.expires_in,
            scope = ?token.scope,
            "Obtained access token"
        );
        Ok(token)
    }
}

#[async_trait]
impl TokenSource for TokenExchangeClient {
    async fn access_token(&self) -> AuthResult<AccessToken> {
        self.exchange().await
    }
}
