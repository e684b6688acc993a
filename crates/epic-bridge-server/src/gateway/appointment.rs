//! Appointment search, read and `$find`.
//!
//! Epic only exposes `Appointment/$find` on its STU3 endpoint, so that one
//! operation goes to the STU3 base while the rest use R4.

use epic_bridge_auth::AccessToken;
use serde_json::Value;
use tracing::instrument;

use super::{FhirGateway, GatewayError, resource_url, search_url};

impl FhirGateway {
    /// `GET Appointment?<query>` with the query string forwarded as received.
    #[instrument(skip(self, token, query))]
    pub async fn search_appointments(
        &self,
        token: &AccessToken,
        query: Option<&str>,
    ) -> Result<Value, GatewayError> {
        let url = search_url(self.r4_base(), "Appointment", query)?;
        self.send_json(self.get(url, token)).await
    }

    /// `GET Appointment/{id}`.
    #[instrument(skip(self, token, id))]
    pub async fn read_appointment(
        &self,
        token: &AccessToken,
        id: &str,
    ) -> Result<Value, GatewayError> {
        let url = resource_url(self.r4_base(), &["Appointment", id])?;
        self.send_json(self.get(url, token)).await
    }

    /// `POST Appointment/$find` on the STU3 base.
    #[instrument(skip(self, token, parameters))]
    pub async fn find_appointments(
        &self,
        token: &AccessToken,
        parameters: &Value,
    ) -> Result<Value, GatewayError> {
        let url = resource_url(self.stu3_base(), &["Appointment", "$find"])?;
        self.send_json(self.post_json(url, token, parameters)).await
    }
}
