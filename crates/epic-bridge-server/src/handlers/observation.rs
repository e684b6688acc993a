use axum::extract::State;
use serde_json::Value;

use super::{ApiJson, access_token};
use crate::envelope::{Data, Envelope};
use crate::error::ApiError;
use crate::gateway::CreatedResource;
use crate::server::AppState;

/// `POST /observation`: creates the Observation as given, answers 201.
pub async fn create_observation(
    State(state): State<AppState>,
    ApiJson(observation): ApiJson<Value>,
) -> Result<Envelope<Data<CreatedResource>>, ApiError> {
    let token = access_token(&state).await?;
    let created = state
        .gateway
        .create_observation(&token, &observation)
        .await
        .map_err(ApiError::gateway("Failed to create observation"))?;
    Ok(Envelope::created(
        "Observation created successfully",
        Data { data: created },
    ))
}
