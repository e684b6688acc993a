//! Gateway-specific error types.

/// Errors raised while talking to the FHIR server.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The FHIR server could not be reached or the transfer broke off.
    #[error("FHIR server request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// The FHIR server answered with a non-success status.
    #[error("FHIR server returned HTTP {status}")]
    Upstream {
        /// HTTP status from the FHIR server.
        status: u16,
        /// Raw response body, passed through to the caller.
        body: String,
    },

    /// A field the operation depends on is absent from the upstream response.
    #[error("{0}")]
    MissingData(String),

    /// A referenced resource could not be located.
    #[error("{0}")]
    NotFound(String),

    /// A caller-supplied URL is malformed or points outside the FHIR server.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The upstream response could not be interpreted.
    #[error("Invalid FHIR server response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// Returns `true` for failures caused by the shape of upstream data rather
    /// than transport or status problems.
    #[must_use]
    pub fn is_data_shape(&self) -> bool {
        matches!(
            self,
            Self::MissingData(_) | Self::NotFound(_) | Self::InvalidResponse(_)
        )
    }
}
