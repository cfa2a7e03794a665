//! Configuration management for Studylift.
//!
//! TOML-based configuration loading, parsing and validation with:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - `STUDYLIFT_*` environment variable overrides
//! - Default values for optional settings
//! - Comprehensive validation on load
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use studylift::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("studylift.toml")?;
//!
//! println!("ODM source: {:?}", config.odm.source);
//! println!("FHIR target: {:?}", config.fhir.target);
//! # Ok(())
//! # }
//! ```
//!
//! # Example Configuration
//!
//! ```toml
//! [odm]
//! source = "redcap"
//!
//! [odm.redcap]
//! api_url = "https://redcap.example.org/api/"
//! api_token = "${STUDYLIFT_REDCAP_API_TOKEN}"
//! patients_per_call = 50
//!
//! [mapping]
//! incomplete_forms_allowed = false
//! assigner = "Example Medical Center"
//!
//! [fhir]
//! target = "server"
//!
//! [fhir.server]
//! base_url = "https://fhir.example.org/fhir"
//! username = "studylift"
//! password = "${STUDYLIFT_SERVER_PASSWORD}"
//!
//! [state]
//! cache_dir = "/var/cache/studylift"
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

// Re-export commonly used types
pub use loader::load_config;
pub use schema::{
    ApplicationConfig, DisConfig, FhirConfig, FileSinkConfig, FileSourceConfig, LoggingConfig,
    MappingConfig, OdmConfig, QueueSinkConfig, RedcapConfig, ServerSinkConfig, SourceKind,
    StateConfig, StudyliftConfig, TargetKind,
};
pub use secret::{secret_string, secret_string_opt, SecretString, SecretValue};
