//! Resource gateway: one outbound FHIR call per inbound operation.
//!
//! Every operation takes a bearer [`AccessToken`] and the caller's
//! parameters, builds exactly one request against Epic's FHIR API (two for
//! the DocumentReference read, which follows the Binary reference), and
//! returns the upstream JSON or stream.
//!
//! ```text
//! ┌──────────┐   token    ┌──────────────┐  GET/POST   ┌──────────────┐
//! │ handlers │ ─────────▶ │ FhirGateway  │ ──────────▶ │  Epic FHIR   │
//! └──────────┘            └──────────────┘             └──────────────┘
//!                           R4 base: Patient, Observation, DocumentReference,
//!                                    Binary, Appointment, Group/$export
//!                           STU3 base: Appointment/$find
//! ```
//!
//! Query strings and request bodies are forwarded verbatim. Nothing is
//! validated against FHIR profiles locally; upstream rejections are passed
//! back unchanged.

pub mod appointment;
pub mod bulk;
pub mod document;
pub mod error;
pub mod observation;
pub mod patient;

use std::time::Duration;

use epic_bridge_auth::AccessToken;
use reqwest::header::{ACCEPT, CONTENT_TYPE, LOCATION};
use reqwest::{RequestBuilder, Response};
use serde::Serialize;
use serde_json::Value;
use url::Url;

pub use bulk::{ExportFile, ExportStatus};
pub use document::DocumentUpload;
pub use error::GatewayError;

/// Media type for FHIR JSON.
pub const FHIR_JSON: &str = "application/fhir+json";

/// Media type for bulk export files.
pub const FHIR_NDJSON: &str = "application/fhir+ndjson";

/// Configuration for the FHIR gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// R4 API base, e.g. `https://fhir.epic.com/interconnect-fhir-oauth/api/FHIR/R4/`.
    pub r4_base: Url,

    /// STU3 API base, used for `Appointment/$find`.
    pub stu3_base: Url,

    /// Timeout for regular (non-streaming) requests.
    pub request_timeout: Duration,
}

/// Outcome of a create interaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedResource {
    /// Logical id parsed from `Location`, or from the returned resource.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Raw `Location` header.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Response body, when the server returned one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<Value>,
}

/// HTTP client bound to Epic's FHIR endpoints.
#[derive(Debug, Clone)]
pub struct FhirGateway {
    http_client: reqwest::Client,
    download_client: reqwest::Client,
    r4_base: Url,
    stu3_base: Url,
}

impl FhirGateway {
    /// Creates a gateway with its own connection pools.
    ///
    /// Downloads use a separate client with only a connect timeout, so large
    /// export files are not cut off mid-stream.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn new(config: GatewayConfig) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let download_client = reqwest::Client::builder()
            .connect_timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http_client,
            download_client,
            r4_base: with_trailing_slash(config.r4_base),
            stu3_base: with_trailing_slash(config.stu3_base),
        })
    }

    /// R4 API base URL.
    #[must_use]
    pub fn r4_base(&self) -> &Url {
        &self.r4_base
    }

    /// STU3 API base URL.
    #[must_use]
    pub fn stu3_base(&self) -> &Url {
        &self.stu3_base
    }

    /// `GET` with bearer auth and FHIR JSON accept header.
    fn get(&self, url: Url, token: &AccessToken) -> RequestBuilder {
        self.http_client
            .get(url)
            .bearer_auth(token.secret())
            .header(ACCEPT, FHIR_JSON)
    }

    /// `POST` of a FHIR JSON body with bearer auth.
    fn post_json(&self, url: Url, token: &AccessToken, body: &Value) -> RequestBuilder {
        self.http_client
            .post(url)
            .bearer_auth(token.secret())
            .header(ACCEPT, FHIR_JSON)
            .header(CONTENT_TYPE, FHIR_JSON)
            .json(body)
    }

    /// Sends `request` and returns the JSON body of a successful response.
    async fn send_json(&self, request: RequestBuilder) -> Result<Value, GatewayError> {
        let response = ensure_success(request.send().await?).await?;
        json_body(response).await
    }

    /// Sends a create request and collects `Location` plus any returned body.
    async fn send_create(&self, request: RequestBuilder) -> Result<CreatedResource, GatewayError> {
        let response = ensure_success(request.send().await?).await?;

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let body = response.text().await?;
        let resource = if body.trim().is_empty() {
            None
        } else {
            serde_json::from_str::<Value>(&body).ok()
        };

        let id = location.as_deref().and_then(id_from_location).or_else(|| {
            resource
                .as_ref()
                .and_then(|r| r.get("id"))
                .and_then(Value::as_str)
                .map(str::to_owned)
        });

        Ok(CreatedResource {
            id,
            location,
            resource,
        })
    }

    /// Parses a caller- or server-supplied URL and checks that it points at
    /// the configured FHIR server, so the bearer token never leaves it.
    ///
    /// # Errors
    ///
    /// [`GatewayError::InvalidUrl`] for unparseable, non-http(s) or foreign
    /// URLs.
    pub fn same_origin_url(&self, raw: &str) -> Result<Url, GatewayError> {
        let url = Url::parse(raw.trim())
            .map_err(|e| GatewayError::InvalidUrl(format!("{raw}: {e}")))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(GatewayError::InvalidUrl(format!(
                "{raw}: unsupported scheme {}",
                url.scheme()
            )));
        }
        if url.origin() != self.r4_base.origin() {
            return Err(GatewayError::InvalidUrl(format!(
                "{raw}: not on the FHIR server {}",
                self.r4_base.origin().ascii_serialization()
            )));
        }
        Ok(url)
    }
}

/// Appends path segments to `base`, percent-encoding each one.
pub(crate) fn resource_url(base: &Url, segments: &[&str]) -> Result<Url, GatewayError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| GatewayError::InvalidUrl(format!("{base} cannot be a base URL")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Like [`resource_url`], then attaches `query` exactly as received.
pub(crate) fn search_url(
    base: &Url,
    resource_type: &str,
    query: Option<&str>,
) -> Result<Url, GatewayError> {
    let mut url = resource_url(base, &[resource_type])?;
    url.set_query(query.filter(|q| !q.is_empty()));
    Ok(url)
}

/// Turns non-2xx responses into [`GatewayError::Upstream`] with the body kept.
pub(crate) async fn ensure_success(response: Response) -> Result<Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::warn!(status = status.as_u16(), "FHIR server returned error status");
    Err(GatewayError::Upstream {
        status: status.as_u16(),
        body,
    })
}

/// Reads a response body as JSON. An empty body becomes `null`.
pub(crate) async fn json_body(response: Response) -> Result<Value, GatewayError> {
    let body = response.text().await?;
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body).map_err(|e| GatewayError::InvalidResponse(e.to_string()))
}

/// Extracts the logical id from a `Location` header such as
/// `https://host/R4/DocumentReference/123` or
/// `DocumentReference/123/_history/1`.
pub fn id_from_location(location: &str) -> Option<String> {
    let path = location.split(['?', '#']).next().unwrap_or_default();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let id = match segments.iter().position(|s| *s == "_history") {
        Some(idx) if idx > 0 => segments[idx - 1],
        Some(_) => return None,
        None => segments.last().copied()?,
    };
    Some(id.to_string())
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
