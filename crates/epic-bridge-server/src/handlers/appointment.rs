use axum::extract::{Path, RawQuery, State};
use serde_json::Value;

use super::{ApiJson, access_token};
use crate::envelope::{Data, Envelope};
use crate::error::ApiError;
use crate::server::AppState;

/// `GET /appointments?<query>`
pub async fn search_appointments(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Result<Envelope<Data<Value>>, ApiError> {
    let token = access_token(&state).await?;
    let bundle = state
        .gateway
        .search_appointments(&token, query.as_deref())
        .await
        .map_err(ApiError::gateway("Failed to search appointments"))?;
    Ok(Envelope::data("Appointments retrieved successfully", bundle))
}

/// `GET /scheduled-surgery/{id}`
pub async fn scheduled_surgery(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Envelope<Data<Value>>, ApiError> {
    let token = access_token(&state).await?;
    let appointment = state
        .gateway
        .read_appointment(&token, &id)
        .await
        .map_err(ApiError::gateway("Failed to fetch scheduled surgery"))?;
    Ok(Envelope::data(
        "Scheduled surgery retrieved successfully",
        appointment,
    ))
}

/// `POST /appointment-find`
pub async fn find_appointments(
    State(state): State<AppState>,
    ApiJson(parameters): ApiJson<Value>,
) -> Result<Envelope<Data<Value>>, ApiError> {
    let token = access_token(&state).await?;
    let slots = state
        .gateway
        .find_appointments(&token, &parameters)
        .await
        .map_err(ApiError::gateway("Failed to find appointments"))?;
    Ok(Envelope::data("Appointment slots retrieved successfully", slots))
}
