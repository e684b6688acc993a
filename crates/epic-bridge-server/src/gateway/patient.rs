//! Patient read, search and `$match`.

use epic_bridge_auth::AccessToken;
use serde_json::Value;
use tracing::instrument;

use super::{FhirGateway, GatewayError, resource_url, search_url};

impl FhirGateway {
    /// `GET Patient/{id}` against the R4 base.
    #[instrument(skip(self, token, id))]
    pub async fn read_patient(&self, token: &AccessToken, id: &str) -> Result<Value, GatewayError> {
        let url = resource_url(self.r4_base(), &["Patient", id])?;
        self.send_json(self.get(url, token)).await
    }

    /// `GET Patient?<query>` with the query string forwarded as received.
    #[instrument(skip(self, token, query))]
    pub async fn search_patients(
        &self,
        token: &AccessToken,
        query: Option<&str>,
    ) -> Result<Value, GatewayError> {
        let url = search_url(self.r4_base(), "Patient", query)?;
        self.send_json(self.get(url, token)).await
    }

    /// `POST Patient/$match` with the caller's `Parameters` resource.
    #[instrument(skip(self, token, parameters))]
    pub async fn match_patient(
        &self,
        token: &AccessToken,
        parameters: &Value,
    ) -> Result<Value, GatewayError> {
        let url = resource_url(self.r4_base(), &["Patient", "$match"])?;
        self.send_json(self.post_json(url, token, parameters)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayConfig;
    use std::io;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use url::Url;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[tokio::test]
    async fn test_upstream_failure_logs_omit_patient_identifiers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let gateway = FhirGateway::new(GatewayConfig {
            r4_base: Url::parse(&format!("{}/R4/", server.uri())).unwrap(),
            stu3_base: Url::parse(&format!("{}/STU3/", server.uri())).unwrap(),
            request_timeout: Duration::from_secs(5),
        })
        .unwrap();
        let token = AccessToken::new("T");

        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        assert!(
            gateway
                .search_patients(&token, Some("family=Lopez&birthdate=1987-09-12"))
                .await
                .is_err()
        );
        assert!(gateway.read_patient(&token, "erSecretPatient").await.is_err());

        let output = logs.contents();
        assert!(output.contains("FHIR server returned error status"));
        assert!(!output.contains("Lopez"));
        assert!(!output.contains("1987-09-12"));
        assert!(!output.contains("erSecretPatient"));
    }
}
