//! Local ODM file source

use crate::config::FileSourceConfig;
use crate::domain::errors::SourceError;
use crate::domain::odm::Odm;
use crate::domain::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

/// Reads one ODM document from a local XML file
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(config: &FileSourceConfig) -> Self {
        Self {
            path: PathBuf::from(&config.path),
        }
    }
}

#[async_trait]
impl super::traits::OdmSource for FileSource {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn fetch(&self, _window_start: Option<&str>) -> Result<Vec<Odm>> {
        let contents = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            SourceError::FileNotReadable(format!("{}: {}", self.path.display(), e))
        })?;

        let odm = Odm::parse(&contents)?;
        info!(path = %self.path.display(), "Read ODM document");
        Ok(vec![odm])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::odm::traits::OdmSource;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_fetch_reads_and_parses() {
        let xml = r#"<ODM CreationDateTime="2024-03-01T12:00:00">
          <ClinicalData StudyOID="S">
            <SubjectData SubjectKey="S1">
              <StudyEventData StudyEventOID="V1" StudyEventRepeatKey="1"/>
            </SubjectData>
          </ClinicalData>
        </ODM>"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(xml.as_bytes()).unwrap();
        file.flush().unwrap();

        let source = FileSource::new(&FileSourceConfig {
            path: file.path().to_str().unwrap().to_string(),
        });
        let documents = source.fetch(None).await.unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].subjects().count(), 1);
    }

    #[tokio::test]
    async fn test_fetch_missing_file_is_source_error() {
        let source = FileSource::new(&FileSourceConfig {
            path: "/nonexistent/odm.xml".to_string(),
        });
        let result = source.fetch(None).await;
        assert!(result.is_err());
    }
}
