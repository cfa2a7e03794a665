//! REDCap API source
//!
//! Fetches ODM documents from a REDCap project in two steps: one call
//! listing all record ids, then one ODM export per chunk of
//! `patients_per_call` records. The previous-run timestamp, when known,
//! bounds the export window via `dateRangeBegin`.

use super::traits::{error_for_status, OdmSource};
use crate::config::{RedcapConfig, SecretString};
use crate::domain::errors::SourceError;
use crate::domain::odm::Odm;
use crate::domain::Result;
use async_trait::async_trait;
use futures::future::try_join_all;
use secrecy::ExposeSecret;
use std::time::Duration;
use tracing::{debug, info};

pub struct RedcapSource {
    api_url: String,
    api_token: SecretString,
    patients_per_call: usize,
    client: reqwest::Client,
}

impl RedcapSource {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &RedcapConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| SourceError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            api_url: config.api_url.clone(),
            api_token: config.api_token.clone(),
            patients_per_call: config.patients_per_call,
            client,
        })
    }

    /// All record ids of the project, in listing order
    async fn record_ids(&self) -> Result<Vec<String>> {
        let form = [
            ("token", self.api_token.expose_secret().as_ref()),
            ("content", "record"),
            ("format", "json"),
            ("fields[0]", "record_id"),
        ];
        let body = self.call(&form).await?;

        let records: Vec<serde_json::Map<String, serde_json::Value>> =
            serde_json::from_str(&body).map_err(|e| {
                SourceError::InvalidResponse(format!("Record listing is not JSON: {e}"))
            })?;

        let mut ids = Vec::new();
        for record in records {
            if let Some(id) = record.get("record_id").and_then(|value| value.as_str()) {
                if !id.is_empty() && !ids.iter().any(|known| known == id) {
                    ids.push(id.to_string());
                }
            }
        }
        Ok(ids)
    }

    /// ODM export for one chunk of records
    async fn export_chunk(&self, records: &[String], window_start: Option<&str>) -> Result<Odm> {
        let records = records.join(",");
        let mut form = vec![
            ("token", self.api_token.expose_secret().as_ref().to_string()),
            ("content", "record".to_string()),
            ("format", "odm".to_string()),
            ("records", records),
        ];
        if let Some(begin) = window_start {
            form.push(("dateRangeBegin", begin.to_string()));
        }

        let body = self.call(&form).await?;
        Odm::parse(&body)
    }

    async fn call<T: serde::Serialize + ?Sized>(&self, form: &T) -> Result<String> {
        let response = self
            .client
            .post(&self.api_url)
            .form(form)
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
        Ok(body)
    }
}

#[async_trait]
impl OdmSource for RedcapSource {
    fn name(&self) -> &'static str {
        "redcap"
    }

    async fn fetch(&self, window_start: Option<&str>) -> Result<Vec<Odm>> {
        let ids = self.record_ids().await?;
        info!(records = ids.len(), "Listed REDCap records");
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let chunk_size = if self.patients_per_call == 0 {
            ids.len()
        } else {
            self.patients_per_call
        };

        let exports = ids.chunks(chunk_size).map(|chunk| {
            debug!(chunk_size = chunk.len(), "Exporting ODM chunk");
            self.export_chunk(chunk, window_start)
        });
        try_join_all(exports).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::secret_string;

    fn config(api_url: &str, patients_per_call: usize) -> RedcapConfig {
        RedcapConfig {
            api_url: api_url.to_string(),
            api_token: secret_string("token".to_string()),
            patients_per_call,
            timeout_seconds: 5,
        }
    }

    const ODM_BODY: &str = r#"<ODM CreationDateTime="2024-03-01T12:00:00">
      <ClinicalData StudyOID="S">
        <SubjectData SubjectKey="S1">
          <StudyEventData StudyEventOID="V1" StudyEventRepeatKey="1"/>
        </SubjectData>
      </ClinicalData>
    </ODM>"#;

    #[tokio::test]
    async fn test_fetch_lists_then_exports() {
        let mut server = mockito::Server::new_async().await;
        let listing = server
            .mock("POST", "/api/")
            .match_body(mockito::Matcher::Regex("content=record".to_string()))
            .match_body(mockito::Matcher::Regex("format=json".to_string()))
            .with_body(r#"[{"record_id":"S1"},{"record_id":"S2"},{"record_id":"S1"}]"#)
            .create_async()
            .await;
        let export = server
            .mock("POST", "/api/")
            .match_body(mockito::Matcher::Regex("format=odm".to_string()))
            .match_body(mockito::Matcher::Regex("records=S1%2CS2".to_string()))
            .with_body(ODM_BODY)
            .create_async()
            .await;

        let source = RedcapSource::new(&config(&format!("{}/api/", server.url()), 0)).unwrap();
        let documents = source.fetch(None).await.unwrap();

        assert_eq!(documents.len(), 1);
        listing.assert_async().await;
        export.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_chunks_per_patients_per_call() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/")
            .match_body(mockito::Matcher::Regex("format=json".to_string()))
            .with_body(r#"[{"record_id":"S1"},{"record_id":"S2"},{"record_id":"S3"}]"#)
            .create_async()
            .await;
        let exports = server
            .mock("POST", "/api/")
            .match_body(mockito::Matcher::Regex("format=odm".to_string()))
            .with_body(ODM_BODY)
            .expect(2)
            .create_async()
            .await;

        let source = RedcapSource::new(&config(&format!("{}/api/", server.url()), 2)).unwrap();
        let documents = source.fetch(Some("2024-02-01T00:00:00")).await.unwrap();

        assert_eq!(documents.len(), 2);
        exports.assert_async().await;
    }

    #[tokio::test]
    async fn test_authentication_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/")
            .with_status(403)
            .with_body("invalid token")
            .create_async()
            .await;

        let source = RedcapSource::new(&config(&format!("{}/api/", server.url()), 0)).unwrap();
        let error = source.fetch(None).await.unwrap_err();
        assert!(error.to_string().contains("Authentication failed"));
    }

    #[tokio::test]
    async fn test_empty_project_yields_no_documents() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/")
            .with_body("[]")
            .create_async()
            .await;

        let source = RedcapSource::new(&config(&format!("{}/api/", server.url()), 0)).unwrap();
        assert!(source.fetch(None).await.unwrap().is_empty());
    }
}
