//! Client authentication error types.
//!
//! Every failure between loading the signing key and receiving an access
//! token from the authorization server is expressed as an [`AuthError`].

/// Errors that can occur while authenticating against the authorization server.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The client configuration is unusable (missing key file, bad URL).
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// The private key could not be parsed or is too weak.
    #[error("Invalid key: {message}")]
    InvalidKey {
        /// Description of why the key was rejected.
        message: String,
    },

    /// The client assertion could not be signed.
    #[error("Failed to sign client assertion: {message}")]
    Signing {
        /// Description of the signing failure.
        message: String,
    },

    /// The token endpoint could not be reached.
    #[error("Token endpoint request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// The token endpoint answered with a non-success status.
    #[error("Token endpoint rejected the assertion with HTTP {status}")]
    TokenRejected {
        /// HTTP status returned by the authorization server.
        status: u16,
        /// Raw response body, passed through to callers.
        body: String,
    },

    /// The token endpoint answered 2xx but the body is not JSON.
    #[error("Malformed token response: {message}")]
    MalformedTokenResponse {
        /// Parser error.
        message: String,
        /// Raw response body.
        body: String,
    },

    /// The token response parsed but carries no usable `access_token`.
    #[error("Token response did not contain an access_token")]
    MissingAccessToken {
        /// Raw response body.
        body: String,
    },
}

impl AuthError {
    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidKey` error.
    #[must_use]
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// Creates a new `Signing` error.
    #[must_use]
    pub fn signing(message: impl Into<String>) -> Self {
        Self::Signing {
            message: message.into(),
        }
    }

    /// Creates a new `MalformedTokenResponse` error.
    #[must_use]
    pub fn malformed_token_response(message: impl Into<String>, body: impl Into<String>) -> Self {
        Self::MalformedTokenResponse {
            message: message.into(),
            body: body.into(),
        }
    }

    /// Returns `true` if this error came out of the token exchange itself
    /// rather than local key or configuration handling.
    #[must_use]
    pub fn is_token_exchange_failure(&self) -> bool {
        matches!(
            self,
            Self::Network(_)
                | Self::TokenRejected { .. }
                | Self::MalformedTokenResponse { .. }
                | Self::MissingAccessToken { .. }
        )
    }

    /// Returns the upstream response body, when the authorization server sent one.
    #[must_use]
    pub fn upstream_body(&self) -> Option<&str> {
        match self {
            Self::TokenRejected { body, .. }
            | Self::MalformedTokenResponse { body, .. }
            | Self::MissingAccessToken { body } => Some(body),
            _ => None,
        }
    }
}
