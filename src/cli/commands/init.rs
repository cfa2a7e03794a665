//! Init command implementation
//!
//! This module implements the `init` command for generating a sample
//! configuration file.

use clap::Args;
use std::fs;
use std::path::Path;

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path where to create the configuration file
    #[arg(short, long, default_value = "studylift.toml")]
    pub output: String,

    /// Overwrite existing file
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    /// Execute the init command
    pub async fn execute(&self) -> anyhow::Result<i32> {
        tracing::info!(output = %self.output, "Initializing configuration file");

        println!("Initializing Studylift configuration");
        println!();

        if Path::new(&self.output).exists() && !self.force {
            println!("Configuration file already exists: {}", self.output);
            println!("   Use --force to overwrite");
            return Ok(2);
        }

        match fs::write(&self.output, Self::sample_config()) {
            Ok(_) => {
                println!("Configuration file created: {}", self.output);
                println!();
                println!("Next steps:");
                println!("  1. Edit {} with your settings", self.output);
                println!("  2. Set odm.source to 'file', 'redcap' or 'dis'");
                println!("  3. Set fhir.target to 'file', 'server' or 'queue'");
                println!("  4. Put credentials in a .env file:");
                println!("     - STUDYLIFT_REDCAP_API_TOKEN (if using REDCap)");
                println!("     - STUDYLIFT_DIS_PASSWORD (if using DIS)");
                println!("     - STUDYLIFT_SERVER_PASSWORD (if using a FHIR server)");
                println!("  5. Validate configuration: studylift validate-config");
                println!("  6. Run the transfer: studylift run");
                println!();
                Ok(0)
            }
            Err(e) => {
                println!("Failed to write configuration file");
                println!("   Error: {e}");
                Ok(1)
            }
        }
    }

    /// Generate the sample configuration
    fn sample_config() -> &'static str {
        r#"# Studylift Configuration File
# ODM to FHIR transfer tool

[application]
log_level = "info"

[odm]
# Active source: file | redcap | dis
source = "file"

[odm.file]
path = "./data/export.xml"

# [odm.redcap]
# api_url = "https://redcap.example.com/api/"
# api_token = "${STUDYLIFT_REDCAP_API_TOKEN}"
# # 0 fetches all records in a single call
# patients_per_call = 20

# [odm.dis]
# rest_url = "https://dis.example.com/rest/odm"
# username = "studylift"
# password = "${STUDYLIFT_DIS_PASSWORD}"

[mapping]
incomplete_forms_allowed = false
subject_keys_hashed = true
debug_identifiers = false
other_symptoms_removed = false
encounter_designators = ["GECCOVISIT", "fall"]
identifier_base = "https://studylift.example.com/fhir"
# assigner = "Example Study Center"

# [mapping.identifier_systems]
# patient = "https://example.com/fhir/NamingSystem/patientId"

[fhir]
# Active target: file | server | queue
target = "file"
update_as_create = false
strip_displays = false

[fhir.file]
output_dir = "./bundles"

# [fhir.server]
# base_url = "https://fhir.example.com/fhir"
# username = "studylift"
# password = "${STUDYLIFT_SERVER_PASSWORD}"
# timeout_seconds = 30
# max_attempts = 3
# retry_delay_ms = 1000

# [fhir.queue]
# endpoint_url = "https://queue.example.com/ingest"

[state]
# Uncomment to enable incremental runs
# cache_dir = "./cache"

[logging]
local_enabled = true
local_path = "./logs"
local_rotation = "daily"
"#
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sample_config_parses() {
        let config: crate::config::StudyliftConfig =
            toml::from_str(InitArgs::sample_config()).unwrap();
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_init_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("studylift.toml");
        fs::write(&path, "existing").unwrap();

        let args = InitArgs {
            output: path.to_str().unwrap().to_string(),
            force: false,
        };
        let code = args.execute().await.unwrap();
        assert_eq!(code, 2);
        assert_eq!(fs::read_to_string(&path).unwrap(), "existing");
    }

    #[tokio::test]
    async fn test_init_creates_valid_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("studylift.toml");

        let args = InitArgs {
            output: path.to_str().unwrap().to_string(),
            force: false,
        };
        let code = args.execute().await.unwrap();
        assert_eq!(code, 0);

        let config: crate::config::StudyliftConfig =
            toml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(config.validate().is_ok());
    }
}
