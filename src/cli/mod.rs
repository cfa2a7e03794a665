//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for Studylift using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// Studylift - ODM to FHIR transfer tool
#[derive(Parser, Debug)]
#[command(name = "studylift")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "studylift.toml", env = "STUDYLIFT_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "STUDYLIFT_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Transfer study data from the ODM source to the FHIR target
    Run(commands::run::RunArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Show incremental state of the previous run
    Status(commands::status::StatusArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}
