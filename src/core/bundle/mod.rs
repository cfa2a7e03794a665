//! Bundle assembly

pub mod bundler;

pub use bundler::{BundleValidator, Bundler, PatientBundle};
