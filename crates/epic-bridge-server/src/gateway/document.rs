//! DocumentReference upload of an external URL and its read-back.
//!
//! Epic stores no external links on a DocumentReference, so the URL is kept
//! as a base64 `text/plain` attachment. Reading it back follows the
//! attachment reference to the Binary resource and decodes its `data`.

use base64::{Engine, engine::general_purpose::STANDARD};
use epic_bridge_auth::AccessToken;
use serde_json::{Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::instrument;

use super::{CreatedResource, FhirGateway, GatewayError, resource_url};

/// LOINC code used as the DocumentReference type.
pub const PROGRESS_NOTE_LOINC: &str = "11506-3";

/// A validated `POST /upload-url` request.
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    /// External URL to store on the DocumentReference.
    pub document_url: String,

    /// Subject patient id.
    pub patient_id: String,

    /// Encounter to link under `context.encounter`, if any.
    pub encounter_id: Option<String>,
}

/// Builds the DocumentReference that carries `upload.document_url`.
#[must_use]
pub fn document_reference_for_url(upload: &DocumentUpload, now: OffsetDateTime) -> Value {
    let date = now.format(&Rfc3339).unwrap_or_default();

    let mut resource = json!({
        "resourceType": "DocumentReference",
        "status": "current",
        "docStatus": "final",
        "type": {
            "coding": [{
                "system": "http://loinc.org",
                "code": PROGRESS_NOTE_LOINC,
                "display": "Progress note"
            }],
            "text": "Progress note"
        },
        "subject": { "reference": format!("Patient/{}", upload.patient_id) },
        "date": date,
        "content": [{
            "attachment": {
                "contentType": "text/plain",
                "data": STANDARD.encode(upload.document_url.as_bytes())
            }
        }]
    });

    if let Some(encounter) = upload.encounter_id.as_deref().filter(|e| !e.is_empty()) {
        resource["context"] = json!({
            "encounter": [{ "reference": format!("Encounter/{encounter}") }]
        });
    }

    resource
}

/// Attachment reference of the first content entry, if any.
fn attachment_url(document: &Value) -> Option<&str> {
    document
        .get("content")?
        .get(0)?
        .get("attachment")?
        .get("url")?
        .as_str()
        .filter(|s| !s.is_empty())
}

/// Decodes the base64 `data` of a Binary resource into a string.
fn decode_binary(binary: &Value) -> Result<String, GatewayError> {
    let data = binary
        .get("data")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| GatewayError::MissingData("No data found in Binary resource".into()))?;

    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|e| GatewayError::InvalidResponse(format!("Binary data is not base64: {e}")))?;

    String::from_utf8(bytes)
        .map_err(|_| GatewayError::InvalidResponse("Binary data is not valid UTF-8".into()))
}

impl FhirGateway {
    /// Creates a DocumentReference for an external URL and returns its id.
    ///
    /// # Errors
    ///
    /// [`GatewayError::MissingData`] when neither a `Location` header nor a
    /// returned resource id identify the created document.
    #[instrument(skip(self, token, upload))]
    pub async fn create_document_reference(
        &self,
        token: &AccessToken,
        upload: &DocumentUpload,
    ) -> Result<String, GatewayError> {
        let url = resource_url(self.r4_base(), &["DocumentReference"])?;
        let body = document_reference_for_url(upload, OffsetDateTime::now_utc());

        let CreatedResource { id, .. } = self.send_create(self.post_json(url, token, &body)).await?;
        let id = id.ok_or_else(|| {
            GatewayError::MissingData("No Document ID in Location header".into())
        })?;

        tracing::info!(document_id = %id, "DocumentReference created");
        Ok(id)
    }

    /// Reads `DocumentReference/{id}`, follows its Binary reference and
    /// returns the decoded URL.
    #[instrument(skip(self, token, id))]
    pub async fn read_document_url(
        &self,
        token: &AccessToken,
        id: &str,
    ) -> Result<String, GatewayError> {
        let url = resource_url(self.r4_base(), &["DocumentReference", id])?;
        let document = self.send_json(self.get(url, token)).await?;

        let reference = attachment_url(&document)
            .ok_or_else(|| GatewayError::NotFound("No Binary reference found".into()))?;

        let binary_url = self
            .r4_base()
            .join(reference)
            .map_err(|e| GatewayError::InvalidResponse(format!("bad Binary reference: {e}")))?;
        let binary_url = self
            .same_origin_url(binary_url.as_str())
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        let binary = self.send_json(self.get(binary_url, token)).await?;
        decode_binary(&binary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn upload(encounter: Option<&str>) -> DocumentUpload {
        DocumentUpload {
            document_url: "https://x/y.pdf".to_string(),
            patient_id: "P1".to_string(),
            encounter_id: encounter.map(str::to_owned),
        }
    }

    #[test]
    fn test_document_reference_body() {
        let body = document_reference_for_url(&upload(None), datetime!(2024-03-01 12:00 UTC));

        assert_eq!(body["resourceType"], "DocumentReference");
        assert_eq!(body["status"], "current");
        assert_eq!(body["type"]["coding"][0]["code"], PROGRESS_NOTE_LOINC);
        assert_eq!(body["subject"]["reference"], "Patient/P1");
        assert_eq!(body["date"], "2024-03-01T12:00:00Z");

        let attachment = &body["content"][0]["attachment"];
        assert_eq!(attachment["contentType"], "text/plain");
        assert_eq!(attachment["data"], "aHR0cHM6Ly94L3kucGRm");
        assert!(body.get("context").is_none());
    }

    #[test]
    fn test_document_reference_with_encounter() {
        let body =
            document_reference_for_url(&upload(Some("E9")), datetime!(2024-03-01 12:00 UTC));
        assert_eq!(body["context"]["encounter"][0]["reference"], "Encounter/E9");

        let body = document_reference_for_url(&upload(Some("")), datetime!(2024-03-01 12:00 UTC));
        assert!(body.get("context").is_none());
    }

    #[test]
    fn test_attachment_url() {
        let doc = json!({"content": [{"attachment": {"url": "Binary/abc"}}]});
        assert_eq!(attachment_url(&doc), Some("Binary/abc"));

        assert_eq!(attachment_url(&json!({"resourceType": "DocumentReference"})), None);
        assert_eq!(attachment_url(&json!({"content": []})), None);
        assert_eq!(
            attachment_url(&json!({"content": [{"attachment": {"url": ""}}]})),
            None
        );
    }

    #[test]
    fn test_decode_binary() {
        let binary = json!({"resourceType": "Binary", "data": "aHR0cHM6Ly94L3kucGRm"});
        assert_eq!(decode_binary(&binary).unwrap(), "https://x/y.pdf");
    }

    #[test]
    fn test_decode_binary_errors() {
        let err = decode_binary(&json!({"resourceType": "Binary"})).unwrap_err();
        assert_eq!(err.to_string(), "No data found in Binary resource");

        let err = decode_binary(&json!({"data": "!!!"})).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidResponse(_)));

        // 0xff 0xfe is not UTF-8
        let err = decode_binary(&json!({"data": "//4="})).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidResponse(_)));
    }
}
