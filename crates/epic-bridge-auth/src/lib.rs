//! # epic-bridge-auth
//!
//! Client-side SMART Backend Services authentication for Epic's FHIR APIs.
//!
//! This crate provides:
//! - Loading of the RSA signing credential registered with Epic
//! - RS256 JWT client assertions per RFC 7523
//! - The client-credentials token exchange against the token endpoint
//! - An optional short-lived token cache
//! - JWK Set export of the public key
//!
//! ## Modules
//!
//! - [`credential`] - Signing credential (client id, issuer, private key)
//! - [`assertion`] - Client assertion claims and signing
//! - [`token`] - Token exchange client and the [`TokenSource`] seam
//! - [`cache`] - Expiry-aware token cache
//! - [`jwks`] - Public key publication
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use epic_bridge_auth::{SigningCredential, TokenClientConfig, TokenExchangeClient};
//!
//! let credential = Arc::new(SigningCredential::from_pem_file("my-client-id", "keys/private.pem")?);
//! let config = TokenClientConfig::new("https://fhir.epic.com/interconnect-fhir-oauth/oauth2/token".parse()?);
//! let client = TokenExchangeClient::new(config, credential)?;
//!
//! let token = client.exchange().await?;
//! ```

pub mod assertion;
pub mod cache;
pub mod credential;
pub mod error;
pub mod jwks;
pub mod token;

pub use assertion::{
    ASSERTION_LIFETIME_SECONDS, AssertionBuilder, CLIENT_ASSERTION_TYPE, ClientAssertionClaims,
};
pub use cache::{CachingTokenSource, DEFAULT_REFRESH_SKEW};
pub use credential::{MIN_RSA_KEY_BITS, SigningCredential};
pub use error::AuthError;
pub use jwks::{Jwk, JwkSet};
pub use token::{AccessToken, TokenClientConfig, TokenExchangeClient, TokenSource};

/// Type alias for authentication results.
pub type AuthResult<T> = Result<T, AuthError>;
