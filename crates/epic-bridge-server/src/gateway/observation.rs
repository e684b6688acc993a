use epic_bridge_auth::AccessToken;
use serde_json::Value;
use tracing::instrument;

use super::{CreatedResource, FhirGateway, GatewayError, resource_url};

impl FhirGateway {
    /// `POST Observation` with the caller's resource, unmodified.
    #[instrument(skip(self, token, observation))]
    pub async fn create_observation(
        &self,
        token: &AccessToken,
        observation: &Value,
    ) -> Result<CreatedResource, GatewayError> {
        let url = resource_url(self.r4_base(), &["Observation"])?;
        let created = self
            .send_create(self.post_json(url, token, observation))
            .await?;
        tracing::info!(id = ?created.id, "Observation created");
        Ok(created)
    }
}
