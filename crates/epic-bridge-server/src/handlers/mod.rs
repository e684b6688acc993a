//! Route handlers.
//!
//! Each handler validates its input first, then obtains an access token and
//! makes exactly one gateway call. Nothing reaches the network when
//! validation fails.

mod appointment;
mod bulk;
mod document;
mod health;
mod observation;
mod patient;

pub use appointment::{find_appointments, scheduled_surgery, search_appointments};
pub use bulk::{bulk_download, bulk_export, bulk_status};
pub use document::{read_document, upload_url};
pub use health::{healthz, jwks};
pub use observation::create_observation;
pub use patient::{match_patient, read_default_patient, search_patients};

use axum::extract::{FromRequest, FromRequestParts};
use epic_bridge_auth::AccessToken;

use crate::error::ApiError;
use crate::server::AppState;

/// JSON body extractor whose rejection is rendered as an error envelope.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Query extractor whose rejection is rendered as an error envelope.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

/// Fetches a bearer token for one inbound request.
async fn access_token(state: &AppState) -> Result<AccessToken, ApiError> {
    Ok(state.tokens.access_token().await?)
}

/// Returns the trimmed value, or a 400 naming `field` when absent or blank.
fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str, ApiError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::missing(field))
}
