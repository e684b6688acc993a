use axum::body::Body;
use axum::extract::State;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::Response;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{ApiQuery, access_token, required};
use crate::envelope::{Data, Envelope, ExportStarted};
use crate::error::ApiError;
use crate::gateway::ExportStatus;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkExportParams {
    pub group_id: Option<String>,
    /// Comma-separated resource types, passed as `_type`
    pub types: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkStatusParams {
    pub status_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkDownloadParams {
    pub file_url: Option<String>,
}

/// `GET /bulk-export?groupId=..&types=..`
pub async fn bulk_export(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<BulkExportParams>,
) -> Result<Envelope<ExportStarted>, ApiError> {
    let group_id = required(params.group_id.as_deref(), "groupId")?;

    let token = access_token(&state).await?;
    let status_url = state
        .gateway
        .kick_off_export(&token, group_id, params.types.as_deref())
        .await
        .map_err(ApiError::gateway("Failed to initiate bulk export"))?;

    Ok(Envelope::ok(
        "Bulk export initiated successfully",
        ExportStarted { status_url },
    ))
}

/// `GET /bulk-status?statusUrl=..`
pub async fn bulk_status(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<BulkStatusParams>,
) -> Result<Envelope<Data<Value>>, ApiError> {
    let status_url = required(params.status_url.as_deref(), "statusUrl")?;
    state
        .gateway
        .same_origin_url(status_url)
        .map_err(ApiError::gateway("Invalid statusUrl"))?;

    let token = access_token(&state).await?;
    let status = state
        .gateway
        .export_status(&token, status_url)
        .await
        .map_err(ApiError::gateway("Failed to check bulk export status"))?;

    Ok(match status {
        ExportStatus::InProgress {
            progress,
            retry_after,
        } => Envelope::data(
            "Bulk export in progress",
            json!({
                "status": "in-progress",
                "progress": progress,
                "retryAfter": retry_after,
            }),
        ),
        ExportStatus::Complete(manifest) => Envelope::data("Bulk export complete", manifest),
    })
}

/// `GET /bulk-download?fileUrl=..`: streams one export file through.
pub async fn bulk_download(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<BulkDownloadParams>,
) -> Result<Response, ApiError> {
    let file_url = required(params.file_url.as_deref(), "fileUrl")?;
    state
        .gateway
        .same_origin_url(file_url)
        .map_err(ApiError::gateway("Invalid fileUrl"))?;

    let token = access_token(&state).await?;
    let file = state
        .gateway
        .download_export(&token, file_url)
        .await
        .map_err(ApiError::gateway("Failed to download bulk export file"))?;

    tracing::info!(filename = %file.filename, content_type = %file.content_type, "Streaming export file");

    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, file.content_type)
        .header(
            CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", file.filename),
        )
        .body(Body::from_stream(file.stream))
        .map_err(|e| ApiError::Internal(format!("failed to build download response: {e}")))
}
