//! Run command implementation
//!
//! This module implements the `run` command that transfers study data from
//! the configured ODM source to the configured FHIR target.

use crate::config::load_config;
use crate::core::pipeline::PipelineCoordinator;
use clap::Args;

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Process all subjects regardless of cached content hashes.
    /// The cache directory is left untouched for this run.
    #[arg(long)]
    pub full: bool,
}

impl RunArgs {
    /// Execute the run command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Starting run command");

        let mut config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load configuration");
                eprintln!("Failed to load configuration: {e}");
                return Ok(2);
            }
        };

        if let Err(e) = config.validate() {
            tracing::error!(error = %e, "Configuration validation failed");
            eprintln!("Configuration validation failed: {e}");
            return Ok(2);
        }

        if self.full {
            tracing::info!("Full run requested, change tracking disabled for this run");
            config.state.cache_dir = None;
        }

        let mut coordinator = match PipelineCoordinator::from_config(&config) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Failed to create pipeline");
                eprintln!("Failed to initialize pipeline: {e}");
                return Ok(1);
            }
        };

        let summary = match coordinator.run().await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Run failed");
                eprintln!("Run failed: {e}");
                return Ok(1);
            }
        };

        println!();
        println!("Run Summary:");
        println!("  Subjects: {}", summary.subjects_seen);
        println!("  Unchanged: {}", summary.subjects_unchanged);
        println!("  Empty bundles: {}", summary.bundles_empty);
        println!("  Failed: {}", summary.subjects_failed);
        println!("  Bundles written: {}", summary.bundles_written);
        println!("  Resources written: {}", summary.resources_written);
        println!();

        let exit_code = if summary.is_successful() {
            println!("Run completed successfully.");
            0
        } else {
            println!("Run completed with subject failures.");
            1
        };

        Ok(exit_code)
    }
}
