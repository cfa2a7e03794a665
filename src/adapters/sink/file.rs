//! File sink
//!
//! Writes one pretty-printed JSON file per patient bundle, named by the
//! logical patient identifier value.

use super::traits::BundleSink;
use crate::config::FileSinkConfig;
use crate::core::bundle::PatientBundle;
use crate::domain::errors::DeliveryError;
use crate::domain::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

pub struct FileSink {
    output_dir: PathBuf,
}

impl FileSink {
    pub fn new(config: &FileSinkConfig) -> Self {
        Self {
            output_dir: PathBuf::from(&config.output_dir),
        }
    }
}

#[async_trait]
impl BundleSink for FileSink {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn deliver(&self, bundle: &PatientBundle) -> Result<()> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| {
                DeliveryError::WriteFailed(format!(
                    "{}: {}",
                    self.output_dir.display(),
                    e
                ))
            })?;

        let path = self
            .output_dir
            .join(format!("{}.json", bundle.patient_identifier));
        let json = serde_json::to_string_pretty(&bundle.bundle)
            .map_err(|e| DeliveryError::WriteFailed(e.to_string()))?;

        tokio::fs::write(&path, json)
            .await
            .map_err(|e| DeliveryError::WriteFailed(format!("{}: {}", path.display(), e)))?;

        debug!(path = %path.display(), "Wrote bundle file");
        Ok(())
    }
}
