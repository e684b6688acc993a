//! Uniform response envelope.
//!
//! Successful responses look like `{"success": true, "message": ..., <payload>}`
//! where the payload is usually `{"data": ...}` and, for a few routes, a
//! single named field such as `documentId`. Errors are produced by
//! [`ApiError`](crate::error::ApiError).

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Success envelope around a route-specific payload.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub message: String,
    #[serde(flatten)]
    pub payload: T,
    #[serde(skip)]
    status: StatusCode,
}

/// Payload under a `data` key.
#[derive(Debug, Clone, Serialize)]
pub struct Data<T> {
    pub data: T,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentCreated {
    pub document_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResolved {
    pub document_url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportStarted {
    pub status_url: String,
}

impl<T: Serialize> Envelope<T> {
    /// `200 OK` envelope.
    pub fn ok(message: impl Into<String>, payload: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            payload,
            status: StatusCode::OK,
        }
    }

    /// `201 Created` envelope.
    pub fn created(message: impl Into<String>, payload: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            ..Self::ok(message, payload)
        }
    }
}

impl<T: Serialize> Envelope<Data<T>> {
    /// `200 OK` envelope with the payload under `data`.
    pub fn data(message: impl Into<String>, data: T) -> Self {
        Self::ok(message, Data { data })
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}
