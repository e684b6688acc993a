//! Public key publication as a JWK Set.
//!
//! Epic can be pointed at a JWK Set URL instead of an uploaded certificate.
//! The set served here contains exactly the public half of the signing
//! credential, with the same `kid` that goes into every assertion header.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};

use crate::credential::SigningCredential;

/// A JSON Web Key (RFC 7517) for an RSA signing key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type, always `RSA`.
    pub kty: String,

    /// Key ID.
    pub kid: String,

    /// Key use, always `sig`.
    #[serde(rename = "use")]
    pub use_: String,

    /// Algorithm.
    pub alg: String,

    /// RSA modulus (base64url encoded).
    pub n: String,

    /// RSA exponent (base64url encoded).
    pub e: String,
}

/// JSON Web Key Set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwkSet {
    /// Published keys.
    pub keys: Vec<Jwk>,
}

impl Jwk {
    /// Exports the public key of `credential`.
    #[must_use]
    pub fn from_credential(credential: &SigningCredential) -> Self {
        Self {
            kty: "RSA".to_string(),
            kid: credential.key_id().to_string(),
            use_: "sig".to_string(),
            alg: "RS256".to_string(),
            n: URL_SAFE_NO_PAD.encode(credential.modulus()),
            e: URL_SAFE_NO_PAD.encode(credential.exponent()),
        }
    }
}

impl JwkSet {
    /// A set containing only the public key of `credential`.
    #[must_use]
    pub fn for_credential(credential: &SigningCredential) -> Self {
        Self {
            keys: vec![Jwk::from_credential(credential)],
        }
    }
}
