use axum::extract::{Path, State};
use serde::Deserialize;

use super::{ApiJson, access_token, required};
use crate::envelope::{DocumentCreated, DocumentResolved, Envelope};
use crate::error::ApiError;
use crate::gateway::DocumentUpload;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlRequest {
    #[serde(default)]
    pub document_url: Option<String>,
    #[serde(default)]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub encounter_id: Option<String>,
}

impl UploadUrlRequest {
    fn into_upload(self) -> Result<DocumentUpload, ApiError> {
        let document_url = required(self.document_url.as_deref(), "documentUrl")?.to_string();
        let patient_id = required(self.patient_id.as_deref(), "patientId")?.to_string();
        let encounter_id = self
            .encounter_id
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());

        Ok(DocumentUpload {
            document_url,
            patient_id,
            encounter_id,
        })
    }
}

/// `POST /upload-url`: stores an external URL as a DocumentReference.
pub async fn upload_url(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<UploadUrlRequest>,
) -> Result<Envelope<DocumentCreated>, ApiError> {
    let upload = request.into_upload()?;

    let token = access_token(&state).await?;
    let document_id = state
        .gateway
        .create_document_reference(&token, &upload)
        .await
        .map_err(ApiError::gateway("Failed to upload document URL"))?;

    Ok(Envelope::ok(
        "Document URL uploaded successfully",
        DocumentCreated { document_id },
    ))
}

/// `GET /document/{documentId}`: resolves the URL stored by `/upload-url`.
pub async fn read_document(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
) -> Result<Envelope<DocumentResolved>, ApiError> {
    let token = access_token(&state).await?;
    let document_url = state
        .gateway
        .read_document_url(&token, &document_id)
        .await
        .map_err(ApiError::gateway("Failed to retrieve document"))?;

    Ok(Envelope::ok(
        "Document URL retrieved successfully",
        DocumentResolved { document_url },
    ))
}
