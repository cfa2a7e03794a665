//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::StudyliftConfig;
use crate::config::secret_string;
use crate::domain::errors::StudyliftError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into StudyliftConfig
/// 4. Applies environment variable overrides (STUDYLIFT_* prefix)
/// 5. Validates the configuration
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Errors
///
/// Returns an error if:
/// - File cannot be read
/// - TOML parsing fails
/// - Environment variable substitution fails
/// - Configuration validation fails
pub fn load_config(path: impl AsRef<Path>) -> Result<StudyliftConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(StudyliftError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        StudyliftError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    let contents = substitute_env_vars(&contents)?;

    let mut config: StudyliftConfig = toml::from_str(&contents)
        .map_err(|e| StudyliftError::Configuration(format!("Failed to parse TOML: {e}")))?;

    apply_env_overrides(&mut config);

    config.validate().map_err(|e| {
        StudyliftError::Configuration(format!("Configuration validation failed: {e}"))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// # Errors
///
/// Returns an error if a referenced environment variable is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();
    let mut result = String::new();
    let mut missing_vars = Vec::new();

    // Process line by line to skip comments
    for line in input.lines() {
        let trimmed = line.trim_start();

        if trimmed.starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let mut processed_line = line.to_string();
        for cap in re.captures_iter(line) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    let placeholder = format!("${{{var_name}}}");
                    processed_line = processed_line.replace(&placeholder, &value);
                }
                Err(_) => {
                    if !missing_vars.contains(&var_name.to_string()) {
                        missing_vars.push(var_name.to_string());
                    }
                }
            }
        }
        result.push_str(&processed_line);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(StudyliftError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

/// Applies environment variable overrides using the STUDYLIFT_* prefix
///
/// Environment variables follow the pattern: STUDYLIFT_<SECTION>_<KEY>
/// For example: STUDYLIFT_REDCAP_API_TOKEN, STUDYLIFT_SERVER_BASE_URL.
/// Endpoints, credentials, paths and behavior toggles are overridable;
/// numeric tuning values (timeouts, retry settings, rotation) come from
/// the configuration file only.
fn apply_env_overrides(config: &mut StudyliftConfig) {
    if let Ok(val) = std::env::var("STUDYLIFT_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }

    if let Some(ref mut file) = config.odm.file {
        if let Ok(val) = std::env::var("STUDYLIFT_FILE_PATH") {
            file.path = val;
        }
    }
    if let Some(ref mut redcap) = config.odm.redcap {
        if let Ok(val) = std::env::var("STUDYLIFT_REDCAP_API_URL") {
            redcap.api_url = val;
        }
        if let Ok(val) = std::env::var("STUDYLIFT_REDCAP_API_TOKEN") {
            redcap.api_token = secret_string(val);
        }
        if let Ok(val) = std::env::var("STUDYLIFT_REDCAP_PATIENTS_PER_CALL") {
            if let Ok(count) = val.parse() {
                redcap.patients_per_call = count;
            }
        }
    }
    if let Some(ref mut dis) = config.odm.dis {
        if let Ok(val) = std::env::var("STUDYLIFT_DIS_REST_URL") {
            dis.rest_url = val;
        }
        if let Ok(val) = std::env::var("STUDYLIFT_DIS_USERNAME") {
            dis.username = val;
        }
        if let Ok(val) = std::env::var("STUDYLIFT_DIS_PASSWORD") {
            dis.password = secret_string(val);
        }
    }

    if let Ok(val) = std::env::var("STUDYLIFT_MAPPING_INCOMPLETE_FORMS_ALLOWED") {
        config.mapping.incomplete_forms_allowed = val.parse().unwrap_or(false);
    }
    if let Ok(val) = std::env::var("STUDYLIFT_MAPPING_SUBJECT_KEYS_HASHED") {
        config.mapping.subject_keys_hashed = val.parse().unwrap_or(true);
    }
    if let Ok(val) = std::env::var("STUDYLIFT_MAPPING_DEBUG_IDENTIFIERS") {
        config.mapping.debug_identifiers = val.parse().unwrap_or(false);
    }

    if let Ok(val) = std::env::var("STUDYLIFT_FHIR_UPDATE_AS_CREATE") {
        config.fhir.update_as_create = val.parse().unwrap_or(false);
    }
    if let Ok(val) = std::env::var("STUDYLIFT_FHIR_STRIP_DISPLAYS") {
        config.fhir.strip_displays = val.parse().unwrap_or(false);
    }
    if let Some(ref mut file) = config.fhir.file {
        if let Ok(val) = std::env::var("STUDYLIFT_FILE_OUTPUT_DIR") {
            file.output_dir = val;
        }
    }
    if let Some(ref mut server) = config.fhir.server {
        if let Ok(val) = std::env::var("STUDYLIFT_SERVER_BASE_URL") {
            server.base_url = val;
        }
        if let Ok(val) = std::env::var("STUDYLIFT_SERVER_USERNAME") {
            server.username = Some(val);
        }
        if let Ok(val) = std::env::var("STUDYLIFT_SERVER_PASSWORD") {
            server.password = Some(secret_string(val));
        }
    }
    if let Some(ref mut queue) = config.fhir.queue {
        if let Ok(val) = std::env::var("STUDYLIFT_QUEUE_ENDPOINT_URL") {
            queue.endpoint_url = val;
        }
        if let Ok(val) = std::env::var("STUDYLIFT_QUEUE_USERNAME") {
            queue.username = Some(val);
        }
        if let Ok(val) = std::env::var("STUDYLIFT_QUEUE_PASSWORD") {
            queue.password = Some(secret_string(val));
        }
    }

    if let Ok(val) = std::env::var("STUDYLIFT_STATE_CACHE_DIR") {
        config.state.cache_dir = Some(val);
    }
}
