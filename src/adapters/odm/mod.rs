//! ODM source adapters
//!
//! One adapter per supported source: local file, REDCap API and DIS REST.

pub mod dis;
pub mod file;
pub mod redcap;
pub mod traits;

pub use dis::DisSource;
pub use file::FileSource;
pub use redcap::RedcapSource;
pub use traits::OdmSource;

use crate::config::{OdmConfig, SourceKind};
use crate::domain::errors::StudyliftError;
use crate::domain::Result;

/// Create the source matching the configuration
///
/// # Errors
///
/// Returns a configuration error when the section for the selected source
/// is missing.
pub fn create_source(config: &OdmConfig) -> Result<Box<dyn OdmSource>> {
    match config.source {
        SourceKind::File => {
            let file = config.file.as_ref().ok_or_else(|| {
                StudyliftError::Configuration("odm.file configuration missing".to_string())
            })?;
            Ok(Box::new(FileSource::new(file)))
        }
        SourceKind::Redcap => {
            let redcap = config.redcap.as_ref().ok_or_else(|| {
                StudyliftError::Configuration("odm.redcap configuration missing".to_string())
            })?;
            Ok(Box::new(RedcapSource::new(redcap)?))
        }
        SourceKind::Dis => {
            let dis = config.dis.as_ref().ok_or_else(|| {
                StudyliftError::Configuration("odm.dis configuration missing".to_string())
            })?;
            Ok(Box::new(DisSource::new(dis)?))
        }
    }
}
