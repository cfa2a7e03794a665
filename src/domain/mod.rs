//! Domain types shared across the pipeline

pub mod errors;
pub mod fhir;
pub mod odm;
pub mod result;

pub use errors::{DeliveryError, SourceError, StudyliftError};
pub use result::Result;
