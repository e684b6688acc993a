use axum::extract::{RawQuery, State};
use serde_json::Value;

use super::{ApiJson, access_token};
use crate::envelope::{Data, Envelope};
use crate::error::ApiError;
use crate::server::AppState;

/// `GET /patient`: reads the configured default patient.
pub async fn read_default_patient(
    State(state): State<AppState>,
) -> Result<Envelope<Data<Value>>, ApiError> {
    let token = access_token(&state).await?;
    let patient = state
        .gateway
        .read_patient(&token, &state.config.epic.default_patient_id)
        .await
        .map_err(ApiError::gateway("Failed to fetch patient data"))?;
    Ok(Envelope::data("Patient data retrieved successfully", patient))
}

/// `POST /patient-match`
pub async fn match_patient(
    State(state): State<AppState>,
    ApiJson(parameters): ApiJson<Value>,
) -> Result<Envelope<Data<Value>>, ApiError> {
    let token = access_token(&state).await?;
    let bundle = state
        .gateway
        .match_patient(&token, &parameters)
        .await
        .map_err(ApiError::gateway("Failed to match patient"))?;
    Ok(Envelope::data("Patient match completed successfully", bundle))
}

/// `GET /patient-search?<query>`
pub async fn search_patients(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Result<Envelope<Data<Value>>, ApiError> {
    let token = access_token(&state).await?;
    let bundle = state
        .gateway
        .search_patients(&token, query.as_deref())
        .await
        .map_err(ApiError::gateway("Failed to search patients"))?;
    Ok(Envelope::data("Patient search completed successfully", bundle))
}
