//! Data integration system source
//!
//! Fetches the complete ODM export from a DIS REST endpoint with basic
//! authentication. The DIS export is not windowed; change tracking still
//! prevents unchanged subjects from being redelivered.

use super::traits::{error_for_status, OdmSource};
use crate::config::{DisConfig, SecretString};
use crate::domain::errors::SourceError;
use crate::domain::odm::Odm;
use crate::domain::Result;
use async_trait::async_trait;
use secrecy::ExposeSecret;
use std::time::Duration;
use tracing::info;

pub struct DisSource {
    rest_url: String,
    username: String,
    password: SecretString,
    client: reqwest::Client,
}

impl DisSource {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &DisConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| SourceError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            rest_url: config.rest_url.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            client,
        })
    }
}

#[async_trait]
impl OdmSource for DisSource {
    fn name(&self) -> &'static str {
        "dis"
    }

    async fn fetch(&self, _window_start: Option<&str>) -> Result<Vec<Odm>> {
        let response = self
            .client
            .get(&self.rest_url)
            .basic_auth(
                &self.username,
                Some(self.password.expose_secret().as_ref()),
            )
            .send()
            .await
            .map_err(|e| SourceError::ConnectionFailed(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SourceError::InvalidResponse(e.to_string()))?;

        if !status.is_success() {
            return Err(error_for_status(status, body).into());
        }

        let odm = Odm::parse(&body)?;
        info!(subjects = odm.subjects().count(), "Fetched DIS export");
        Ok(vec![odm])
    }
}
