//! Validate config command implementation
//!
//! This module implements the `validate-config` command for validating
//! the Studylift configuration file.

use crate::config::load_config;
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("Validating configuration file: {config_path}");
        println!();

        let config = match load_config(config_path) {
            Ok(c) => {
                println!("Configuration file loaded successfully");
                c
            }
            Err(e) => {
                println!("Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        match config.validate() {
            Ok(_) => {
                println!("Configuration is valid");
                println!();
                println!("Configuration Summary:");
                println!("  Log Level: {}", config.application.log_level);
                println!("  ODM Source: {:?}", config.odm.source);
                println!("  FHIR Target: {:?}", config.fhir.target);
                println!("  Update As Create: {}", config.fhir.update_as_create);
                println!(
                    "  Incomplete Forms Allowed: {}",
                    config.mapping.incomplete_forms_allowed
                );
                println!(
                    "  Subject Keys Hashed: {}",
                    config.mapping.subject_keys_hashed
                );
                println!("  Debug Identifiers: {}", config.mapping.debug_identifiers);
                println!(
                    "  State Cache: {}",
                    config.state.cache_dir.as_deref().unwrap_or("disabled")
                );
                println!();
                Ok(0)
            }
            Err(e) => {
                println!("Configuration validation failed");
                println!("   Error: {e}");
                println!();
                Ok(2)
            }
        }
    }
}
