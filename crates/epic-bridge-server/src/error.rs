//! Router-level errors and the error envelope.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use epic_bridge_auth::AuthError;
use serde_json::{Value, json};

use crate::gateway::GatewayError;

/// Error returned by route handlers.
///
/// Renders as `{"success": false, "message": ..., "error": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Invalid caller input (400). Raised before any upstream call.
    #[error("{0}")]
    BadRequest(String),

    /// Could not obtain an access token.
    #[error("Failed to obtain access token from Epic")]
    Auth(#[from] AuthError),

    /// A FHIR call failed.
    #[error("{context}")]
    Gateway {
        context: &'static str,
        #[source]
        source: GatewayError,
    },

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    #[must_use]
    pub fn missing(field: &str) -> Self {
        Self::BadRequest(format!("{field} is required"))
    }

    /// Adapter for `map_err` that labels a gateway failure.
    pub fn gateway(context: &'static str) -> impl FnOnce(GatewayError) -> Self {
        move |source| Self::Gateway { context, source }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Gateway {
                source: GatewayError::NotFound(_),
                ..
            } => StatusCode::NOT_FOUND,
            Self::Gateway {
                source: GatewayError::InvalidUrl(_),
                ..
            } => StatusCode::BAD_REQUEST,
            Self::Auth(_) | Self::Gateway { .. } | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Gateway { source, .. }
                if source.is_data_shape() || matches!(source, GatewayError::InvalidUrl(_)) =>
            {
                source.to_string()
            }
            other => other.to_string(),
        }
    }

    /// The `error` field: upstream bodies as JSON when they parse, otherwise
    /// as text.
    fn detail(&self) -> Value {
        match self {
            Self::BadRequest(message) | Self::Internal(message) => Value::String(message.clone()),
            Self::Auth(err) => match err.upstream_body() {
                Some(body) => upstream_body(body),
                None => Value::String(err.to_string()),
            },
            Self::Gateway {
                source: GatewayError::Upstream { body, status },
                ..
            } => {
                if body.trim().is_empty() {
                    Value::String(format!("FHIR server returned HTTP {status}"))
                } else {
                    upstream_body(body)
                }
            }
            Self::Gateway { source, .. } => Value::String(source.to_string()),
        }
    }
}

fn upstream_body(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, cause = ?std::error::Error::source(&self), "Request failed");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }

        let body = json!({
            "success": false,
            "message": self.message(),
            "error": self.detail(),
        });
        (status, Json(body)).into_response()
    }
}
