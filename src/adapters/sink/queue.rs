//! Queue sink
//!
//! Publishes each patient bundle as one message to an HTTP queue
//! ingestion endpoint. One bundle, one message; the queue consumer is
//! responsible for redelivery semantics.

use super::traits::BundleSink;
use crate::config::{QueueSinkConfig, SecretString};
use crate::core::bundle::PatientBundle;
use crate::domain::errors::DeliveryError;
use crate::domain::Result;
use async_trait::async_trait;
use secrecy::ExposeSecret;
use std::time::Duration;
use tracing::debug;

pub struct QueueSink {
    endpoint_url: String,
    username: Option<String>,
    password: Option<SecretString>,
    client: reqwest::Client,
}

impl QueueSink {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &QueueSinkConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| DeliveryError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            endpoint_url: config.endpoint_url.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            client,
        })
    }
}

#[async_trait]
impl BundleSink for QueueSink {
    fn name(&self) -> &'static str {
        "queue"
    }

    async fn deliver(&self, bundle: &PatientBundle) -> Result<()> {
        let mut request = self.client.post(&self.endpoint_url).json(&bundle.bundle);
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
            return Err(
                DeliveryError::PublishFailed(format!("{}: {}", status.as_u16(), message)).into(),
            );
        }

        debug!(
            patient = %bundle.patient_identifier,
            resources = bundle.resource_count(),
            "Published bundle message"
        );
        Ok(())
    }
}
