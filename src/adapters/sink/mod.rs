//! Bundle delivery adapters
//!
//! One adapter per supported target: local files, FHIR server
//! transactions and an HTTP message queue.

pub mod file;
pub mod queue;
pub mod server;
pub mod traits;

pub use file::FileSink;
pub use queue::QueueSink;
pub use server::ServerSink;
pub use traits::BundleSink;

use crate::config::{FhirConfig, TargetKind};
use crate::domain::errors::StudyliftError;
use crate::domain::Result;

/// Create the sink matching the configuration
///
/// # Errors
///
/// Returns a configuration error when the section for the selected target
/// is missing.
pub fn create_sink(config: &FhirConfig) -> Result<Box<dyn BundleSink>> {
    match config.target {
        TargetKind::File => {
            let file = config.file.as_ref().ok_or_else(|| {
                StudyliftError::Configuration("fhir.file configuration missing".to_string())
            })?;
            Ok(Box::new(FileSink::new(file)))
        }
        TargetKind::Server => {
            let server = config.server.as_ref().ok_or_else(|| {
                StudyliftError::Configuration("fhir.server configuration missing".to_string())
            })?;
            Ok(Box::new(ServerSink::new(server)?))
        }
        TargetKind::Queue => {
            let queue = config.queue.as_ref().ok_or_else(|| {
                StudyliftError::Configuration("fhir.queue configuration missing".to_string())
            })?;
            Ok(Box::new(QueueSink::new(queue)?))
        }
    }
}
