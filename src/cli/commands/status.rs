//! Status command implementation
//!
//! This module implements the `status` command for displaying the
//! incremental state left behind by the previous run.

use crate::config::load_config;
use crate::core::state::ChangeTracker;
use clap::Args;

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {}

impl StatusArgs {
    /// Execute the status command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Checking incremental state");

        println!("Incremental State");
        println!();

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        let Some(cache_dir) = config.state.cache_dir.as_deref() else {
            println!("Change tracking is disabled (no state.cache_dir configured).");
            println!("Every run processes all subjects.");
            return Ok(0);
        };

        let tracker = match ChangeTracker::open(Some(cache_dir)) {
            Ok(t) => t,
            Err(e) => {
                println!("Failed to read state cache");
                println!("   Error: {e}");
                return Ok(1);
            }
        };

        println!("  Cache Directory: {cache_dir}");
        println!("  Tracked Subjects: {}", tracker.tracked_subjects());
        println!(
            "  Previous Run: {}",
            tracker.previous_run_date_time().unwrap_or("never")
        );
        println!();

        if tracker.tracked_subjects() == 0 {
            println!("No run history found.");
            println!("Run 'studylift run' to start transferring data.");
        }

        Ok(0)
    }
}
