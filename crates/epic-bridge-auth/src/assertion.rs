//! JWT client assertions for the Backend Services client-credentials grant.
//!
//! Implements the client side of RFC 7523: the client proves its identity to
//! the token endpoint by presenting a short-lived JWT signed with its private
//! key instead of a shared secret.
//!
//! # Claims
//!
//! - `iss`: issuer identifier (the client id for Epic)
//! - `sub`: client id
//! - `aud`: token endpoint URL
//! - `exp`: issue time + 300 seconds
//! - `jti`: random UUID, unique per assertion
//! - `iat`: issue time
//!
//! A fresh assertion is signed for every token request. Assertions are
//! never cached or reused, even while a previous one is still valid.

use jsonwebtoken::{Algorithm, Header};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::AuthResult;
use crate::credential::SigningCredential;
use crate::error::AuthError;

/// Value of the `client_assertion_type` form parameter.
pub const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Assertion lifetime. Epic rejects assertions whose `exp` is more than
/// five minutes out.
pub const ASSERTION_LIFETIME_SECONDS: i64 = 300;

/// Signing algorithm used for every assertion.
pub const ASSERTION_ALGORITHM: Algorithm = Algorithm::RS256;

/// JWT claims carried by a client assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientAssertionClaims {
    /// Issuer identifier.
    pub iss: String,

    /// Subject, the client id.
    pub sub: String,

    /// Audience, the token endpoint URL.
    pub aud: String,

    /// Expiration time as Unix timestamp.
    pub exp: i64,

    /// Unique assertion id for replay protection.
    pub jti: String,

    /// Issued-at time as Unix timestamp.
    pub iat: i64,
}

/// Builds signed client assertions for one token endpoint.
#[derive(Debug, Clone)]
pub struct AssertionBuilder {
    audience: String,
}

impl AssertionBuilder {
    /// Creates a builder whose assertions target `token_endpoint`.
    #[must_use]
    pub fn new(token_endpoint: impl Into<String>) -> Self {
        Self {
            audience: token_endpoint.into(),
        }
    }

    /// Token endpoint URL used as the `aud` claim.
    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Produces the claim set for an assertion issued at `now`.
    #[must_use]
    pub fn claims_at(
        &self,
        credential: &SigningCredential,
        now: OffsetDateTime,
    ) -> ClientAssertionClaims {
        let iat = now.unix_timestamp();
        ClientAssertionClaims {
            iss: credential.issuer().to_string(),
            sub: credential.client_id().to_string(),
            aud: self.audience.clone(),
            exp: iat + ASSERTION_LIFETIME_SECONDS,
            jti: uuid::Uuid::new_v4().to_string(),
            iat,
        }
    }

    /// Signs a new assertion for `credential`, valid from now.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Signing`] if the key cannot produce an RS256
    /// signature.
    pub fn build(&self, credential: &SigningCredential) -> AuthResult<String> {
        let claims = self.claims_at(credential, OffsetDateTime::now_utc());
        self.sign(credential, &claims)
    }

    /// Signs an explicit claim set.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Signing`] if encoding fails.
    pub fn sign(
        &self,
        credential: &SigningCredential,
        claims: &ClientAssertionClaims,
    ) -> AuthResult<String> {
        let mut header = Header::new(ASSERTION_ALGORITHM);
        header.kid = Some(credential.key_id().to_string());

        jsonwebtoken::encode(&header, claims, credential.encoding_key()).map_err(|e| {
            tracing::error!(error = %e, client_id = %credential.client_id(), "Assertion signing failed");
            AuthError::signing(e.to_string())
        })
    }
}
