//! Bulk data `$export`: kick-off, status polling and file download.

use axum::body::Bytes;
use epic_bridge_auth::AccessToken;
use futures_util::stream::BoxStream;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_LOCATION, CONTENT_TYPE, RETRY_AFTER};
use serde_json::Value;
use tracing::instrument;
use url::Url;

use super::{
    FHIR_JSON, FHIR_NDJSON, FhirGateway, GatewayError, ensure_success, json_body, resource_url,
};

const PREFER_RESPOND_ASYNC: &str = "respond-async";
const X_PROGRESS: &str = "x-progress";

/// Status of an export job.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportStatus {
    /// `202 Accepted`: still running.
    InProgress {
        progress: Option<String>,
        retry_after: Option<String>,
    },
    /// `200 OK`: completion manifest, unchanged.
    Complete(Value),
}

/// A streaming export file.
pub struct ExportFile {
    pub filename: String,
    pub content_type: String,
    pub stream: BoxStream<'static, Result<Bytes, reqwest::Error>>,
}

impl std::fmt::Debug for ExportFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportFile")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// File name for `Content-Disposition`, from the last path segment of `url`.
///
/// Only `[A-Za-z0-9._-]` are kept so the value is safe inside a quoted header.
#[must_use]
pub fn export_filename(url: &Url) -> String {
    let last = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();

    let name: String = last
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();

    if name.is_empty() || name.chars().all(|c| c == '.') {
        "export.ndjson".to_string()
    } else {
        name
    }
}

fn header_string(
    response: &reqwest::Response,
    name: impl reqwest::header::AsHeaderName,
) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

impl FhirGateway {
    /// `GET Group/{group_id}/$export[?_type=...]` with `Prefer: respond-async`.
    ///
    /// Returns the status URL from `Content-Location`.
    #[instrument(skip(self, token))]
    pub async fn kick_off_export(
        &self,
        token: &AccessToken,
        group_id: &str,
        types: Option<&str>,
    ) -> Result<String, GatewayError> {
        let mut url = resource_url(self.r4_base(), &["Group", group_id, "$export"])?;
        if let Some(types) = types.filter(|t| !t.is_empty()) {
            url.set_query(Some(&format!("_type={types}")));
        }

        let response = self
            .get(url, token)
            .header("Prefer", PREFER_RESPOND_ASYNC)
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let status_url = header_string(&response, CONTENT_LOCATION).ok_or_else(|| {
            GatewayError::MissingData("No Content-Location header in export response".into())
        })?;

        tracing::info!(group_id, "Bulk export started");
        Ok(status_url)
    }

    /// Polls a status URL returned by [`kick_off_export`](Self::kick_off_export).
    #[instrument(skip(self, token, status_url))]
    pub async fn export_status(
        &self,
        token: &AccessToken,
        status_url: &str,
    ) -> Result<ExportStatus, GatewayError> {
        let url = self.same_origin_url(status_url)?;
        let response = ensure_success(self.get(url, token).send().await?).await?;

        if response.status() == StatusCode::ACCEPTED {
            return Ok(ExportStatus::InProgress {
                progress: header_string(&response, X_PROGRESS),
                retry_after: header_string(&response, RETRY_AFTER),
            });
        }

        Ok(ExportStatus::Complete(json_body(response).await?))
    }

    /// Opens an export file for streaming. The body is not buffered.
    #[instrument(skip(self, token, file_url))]
    pub async fn download_export(
        &self,
        token: &AccessToken,
        file_url: &str,
    ) -> Result<ExportFile, GatewayError> {
        let url = self.same_origin_url(file_url)?;
        let filename = export_filename(&url);

        let response = self
            .download_client
            .get(url)
            .bearer_auth(token.secret())
            .header(ACCEPT, format!("{FHIR_NDJSON}, {FHIR_JSON};q=0.5"))
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let content_type =
            header_string(&response, CONTENT_TYPE).unwrap_or_else(|| FHIR_NDJSON.to_string());

        Ok(ExportFile {
            filename,
            content_type,
            stream: Box::pin(response.bytes_stream()),
        })
    }
}
