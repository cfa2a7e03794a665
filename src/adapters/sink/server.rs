//! FHIR server sink
//!
//! Posts transaction bundles to a FHIR server base URL with a fixed-delay
//! retry loop. Every failed attempt is logged; the error of the last
//! attempt is surfaced when all attempts are spent.

use super::traits::BundleSink;
use crate::config::{SecretString, ServerSinkConfig};
use crate::core::bundle::PatientBundle;
use crate::domain::errors::DeliveryError;
use crate::domain::Result;
use async_trait::async_trait;
use secrecy::ExposeSecret;
use std::time::Duration;
use tracing::{debug, warn};

pub struct ServerSink {
    base_url: String,
    username: Option<String>,
    password: Option<SecretString>,
    max_attempts: usize,
    retry_delay: Duration,
    client: reqwest::Client,
}

impl ServerSink {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ServerSinkConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| DeliveryError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            max_attempts: config.max_attempts,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            client,
        })
    }

    async fn post_transaction(&self, bundle: &PatientBundle) -> Result<()> {
        let mut request = self.client.post(&self.base_url).json(&bundle.bundle);
        if let Some(username) = &self.username {
            request = request.basic_auth(
                username,
                self.password
                    .as_ref()
                    .map(|password| password.expose_secret().as_ref().to_string()),
            );
        }

        let response = request
            .send()
            .await
            .map_err(|e| DeliveryError::ConnectionFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(DeliveryError::TransactionRejected {
                status: status.as_u16(),
                message,
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl BundleSink for ServerSink {
    fn name(&self) -> &'static str {
        "server"
    }

    async fn deliver(&self, bundle: &PatientBundle) -> Result<()> {
        let mut last_error = None;
        for attempt in 1..=self.max_attempts {
            match self.post_transaction(bundle).await {
                Ok(()) => {
                    debug!(
                        patient = %bundle.patient_identifier,
                        resources = bundle.resource_count(),
                        attempt,
                        "Transaction accepted"
                    );
                    return Ok(());
                }
                Err(error) => {
                    warn!(
                        patient = %bundle.patient_identifier,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %error,
                        "Transaction attempt failed"
                    );
                    last_error = Some(error);
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        Err(DeliveryError::RetriesExhausted {
            attempts: self.max_attempts,
            message: last_error
                .map(|error| error.to_string())
                .unwrap_or_default(),
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fhir::Bundle;

    fn config(base_url: &str, max_attempts: usize) -> ServerSinkConfig {
        ServerSinkConfig {
            base_url: base_url.to_string(),
            username: None,
            password: None,
            timeout_seconds: 5,
            max_attempts,
            retry_delay_ms: 10,
        }
    }

    fn bundle() -> PatientBundle {
        PatientBundle {
            patient_identifier: "deadbeef".to_string(),
            bundle: Bundle::transaction(vec![]),
        }
    }

    #[tokio::test]
    async fn test_deliver_posts_transaction() {
        let mut server = mockito::Server::new_async().await;
        let endpoint = server
            .mock("POST", "/")
            .match_header("content-type", "application/json")
            .match_body(mockito::Matcher::PartialJson(
                serde_json::json!({"resourceType": "Bundle", "type": "transaction"}),
            ))
            .with_status(200)
            .create_async()
            .await;

        let sink = ServerSink::new(&config(&server.url(), 3)).unwrap();
        sink.deliver(&bundle()).await.unwrap();
        endpoint.assert_async().await;
    }

    #[tokio::test]
    async fn test_deliver_surfaces_last_error_after_all_attempts() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("POST", "/")
            .with_status(422)
            .with_body("unprocessable")
            .expect(3)
            .create_async()
            .await;

        let sink = ServerSink::new(&config(&server.url(), 3)).unwrap();
        let error = sink.deliver(&bundle()).await.unwrap_err();

        failing.assert_async().await;
        let message = error.to_string();
        assert!(message.contains("3 attempts"));
        assert!(message.contains("422"));
    }
}
