//! Configuration schema types
//!
//! This module defines the configuration structure for Studylift.

use crate::config::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

/// Shared check for the http(s) endpoints in this file
fn validate_http_url(field: &str, value: &str) -> Result<(), String> {
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
        Ok(url) => Err(format!(
            "{field} must use http or https, got '{}'",
            url.scheme()
        )),
        Err(e) => Err(format!("{field} is not a valid URL: {e}")),
    }
}

/// ODM source selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Local ODM XML file
    File,
    /// REDCap electronic data capture API
    Redcap,
    /// Data integration system REST endpoint
    Dis,
}

/// Bundle delivery target selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// One JSON file per patient bundle
    File,
    /// FHIR server transaction endpoint
    Server,
    /// HTTP message queue endpoint
    Queue,
}

/// Main Studylift configuration
///
/// This is the root configuration structure that maps to the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyliftConfig {
    /// Application-level settings
    #[serde(default)]
    pub application: ApplicationConfig,

    /// ODM source configuration
    pub odm: OdmConfig,

    /// Mapping behavior
    #[serde(default)]
    pub mapping: MappingConfig,

    /// FHIR delivery configuration
    pub fhir: FhirConfig,

    /// Incremental state configuration
    #[serde(default)]
    pub state: StateConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl StudyliftConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid
    pub fn validate(&self) -> Result<(), String> {
        self.application.validate()?;
        self.odm.validate()?;
        self.mapping.validate()?;
        self.fhir.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl ApplicationConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }
        Ok(())
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// ODM source configuration
///
/// Only the section matching `source` is required; the others may stay in
/// the file for easier switching, only the active one is validated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OdmConfig {
    /// Active source (file, redcap or dis)
    pub source: SourceKind,

    /// Local file source (required if source = file)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FileSourceConfig>,

    /// REDCap API source (required if source = redcap)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redcap: Option<RedcapConfig>,

    /// DIS REST source (required if source = dis)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dis: Option<DisConfig>,
}

impl OdmConfig {
    fn validate(&self) -> Result<(), String> {
        match self.source {
            SourceKind::File => match &self.file {
                Some(config) => config.validate(),
                None => Err("odm.file configuration is required when source = 'file'".to_string()),
            },
            SourceKind::Redcap => match &self.redcap {
                Some(config) => config.validate(),
                None => {
                    Err("odm.redcap configuration is required when source = 'redcap'".to_string())
                }
            },
            SourceKind::Dis => match &self.dis {
                Some(config) => config.validate(),
                None => Err("odm.dis configuration is required when source = 'dis'".to_string()),
            },
        }
    }
}

/// Local ODM XML file source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSourceConfig {
    /// Path to the ODM XML document
    pub path: String,
}

impl FileSourceConfig {
    fn validate(&self) -> Result<(), String> {
        if self.path.is_empty() {
            return Err("odm.file.path cannot be empty".to_string());
        }
        Ok(())
    }
}

/// REDCap API source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedcapConfig {
    /// REDCap API endpoint URL
    pub api_url: String,

    /// REDCap API token
    /// Stored securely in memory and automatically zeroized on drop
    pub api_token: SecretString,

    /// Number of patients fetched per export call (0 = all in one call)
    #[serde(default = "default_patients_per_call")]
    pub patients_per_call: usize,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl RedcapConfig {
    fn validate(&self) -> Result<(), String> {
        use secrecy::ExposeSecret;

        validate_http_url("odm.redcap.api_url", &self.api_url)?;
        if self.api_token.expose_secret().is_empty() {
            return Err("odm.redcap.api_token cannot be empty".to_string());
        }
        Ok(())
    }
}

/// DIS REST source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisConfig {
    /// DIS REST endpoint URL
    pub rest_url: String,

    /// Basic-auth username
    pub username: String,

    /// Basic-auth password
    /// Stored securely in memory and automatically zeroized on drop
    pub password: SecretString,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl DisConfig {
    fn validate(&self) -> Result<(), String> {
        use secrecy::ExposeSecret;

        validate_http_url("odm.dis.rest_url", &self.rest_url)?;
        if self.username.is_empty() {
            return Err("odm.dis.username cannot be empty".to_string());
        }
        if self.password.expose_secret().is_empty() {
            return Err("odm.dis.password cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Mapping behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingConfig {
    /// Accept forms regardless of their completion status
    #[serde(default)]
    pub incomplete_forms_allowed: bool,

    /// Hash subject keys into patient identifiers
    #[serde(default = "default_true")]
    pub subject_keys_hashed: bool,

    /// Keep identifier values human-readable instead of hashing them
    #[serde(default)]
    pub debug_identifiers: bool,

    /// Drop the unspecific "Other" symptom code when specific ones exist
    #[serde(default = "default_true")]
    pub other_symptoms_removed: bool,

    /// Study event OID fragments that mark an encounter-generating visit
    #[serde(default = "default_encounter_designators")]
    pub encounter_designators: Vec<String>,

    /// Name of the identifier-assigning organization
    #[serde(default)]
    pub assigner: Option<String>,

    /// Base URL for generated identifier systems
    #[serde(default = "default_identifier_base")]
    pub identifier_base: String,

    /// Explicit identifier system per resource kind, keyed by lowercase
    /// kind name (patient, encounter, ...)
    #[serde(default)]
    pub identifier_systems: HashMap<String, String>,
}

impl MappingConfig {
    fn validate(&self) -> Result<(), String> {
        if self.identifier_base.is_empty() {
            return Err("mapping.identifier_base cannot be empty".to_string());
        }
        if self.encounter_designators.is_empty() {
            return Err("mapping.encounter_designators cannot be empty".to_string());
        }
        Ok(())
    }
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            incomplete_forms_allowed: false,
            subject_keys_hashed: true,
            debug_identifiers: false,
            other_symptoms_removed: true,
            encounter_designators: default_encounter_designators(),
            assigner: None,
            identifier_base: default_identifier_base(),
            identifier_systems: HashMap::new(),
        }
    }
}

/// FHIR delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FhirConfig {
    /// Active delivery target (file, server or queue)
    pub target: TargetKind,

    /// Send bundle entries as PUT (update-as-create) instead of
    /// conditional POST
    #[serde(default)]
    pub update_as_create: bool,

    /// Strip coding display texts before delivery
    #[serde(default)]
    pub strip_displays: bool,

    /// File target (required if target = file)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FileSinkConfig>,

    /// Server target (required if target = server)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerSinkConfig>,

    /// Queue target (required if target = queue)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<QueueSinkConfig>,
}

impl FhirConfig {
    fn validate(&self) -> Result<(), String> {
        match self.target {
            TargetKind::File => match &self.file {
                Some(config) => config.validate(),
                None => Err("fhir.file configuration is required when target = 'file'".to_string()),
            },
            TargetKind::Server => match &self.server {
                Some(config) => config.validate(),
                None => {
                    Err("fhir.server configuration is required when target = 'server'".to_string())
                }
            },
            TargetKind::Queue => match &self.queue {
                Some(config) => config.validate(),
                None => {
                    Err("fhir.queue configuration is required when target = 'queue'".to_string())
                }
            },
        }
    }
}

/// File delivery target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSinkConfig {
    /// Directory receiving one JSON bundle per patient
    pub output_dir: String,
}

impl FileSinkConfig {
    fn validate(&self) -> Result<(), String> {
        if self.output_dir.is_empty() {
            return Err("fhir.file.output_dir cannot be empty".to_string());
        }
        Ok(())
    }
}

/// FHIR server delivery target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSinkConfig {
    /// FHIR server base URL
    pub base_url: String,

    /// Basic-auth username (optional)
    #[serde(default)]
    pub username: Option<String>,

    /// Basic-auth password (optional)
    /// Stored securely in memory and automatically zeroized on drop
    #[serde(default)]
    pub password: Option<SecretString>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Delivery attempts per bundle before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Fixed delay between attempts in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl ServerSinkConfig {
    fn validate(&self) -> Result<(), String> {
        validate_http_url("fhir.server.base_url", &self.base_url)?;
        if self.max_attempts == 0 || self.max_attempts > 10 {
            return Err(format!(
                "fhir.server.max_attempts must be between 1 and 10, got {}",
                self.max_attempts
            ));
        }
        Ok(())
    }
}

/// HTTP message queue delivery target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSinkConfig {
    /// Queue ingestion endpoint URL
    pub endpoint_url: String,

    /// Basic-auth username (optional)
    #[serde(default)]
    pub username: Option<String>,

    /// Basic-auth password (optional)
    /// Stored securely in memory and automatically zeroized on drop
    #[serde(default)]
    pub password: Option<SecretString>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl QueueSinkConfig {
    fn validate(&self) -> Result<(), String> {
        validate_http_url("fhir.queue.endpoint_url", &self.endpoint_url)?;
        Ok(())
    }
}

/// Incremental state configuration
///
/// Change tracking is active only when a cache directory is configured.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StateConfig {
    /// Directory for subject hashes and the previous-run timestamp
    #[serde(default)]
    pub cache_dir: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Enable local file logging
    #[serde(default = "default_true")]
    pub local_enabled: bool,

    /// Local log file path
    #[serde(default = "default_local_path")]
    pub local_path: String,

    /// Log rotation strategy
    #[serde(default = "default_local_rotation")]
    pub local_rotation: String,
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&self.local_rotation.as_str()) {
            return Err(format!(
                "Invalid logging.local_rotation '{}'. Must be one of: {}",
                self.local_rotation,
                valid_rotations.join(", ")
            ));
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            local_enabled: true,
            local_path: default_local_path(),
            local_rotation: default_local_rotation(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout_seconds() -> u64 {
    60
}

fn default_patients_per_call() -> usize {
    0
}

fn default_max_attempts() -> usize {
    3
}

fn default_retry_delay_ms() -> u64 {
    10_000
}

fn default_encounter_designators() -> Vec<String> {
    vec!["GECCOVISIT".to_string(), "fall".to_string()]
}

fn default_identifier_base() -> String {
    "https://studylift.org/fhir/NamingSystem".to_string()
}

fn default_local_path() -> String {
    "/var/log/studylift".to_string()
}

fn default_local_rotation() -> String {
    "daily".to_string()
}
