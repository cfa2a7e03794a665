// Studylift - ODM to FHIR Transfer Tool
// Copyright (c) 2025 Studylift Contributors
// Licensed under the MIT License

//! # Studylift - ODM to FHIR Transfer
//!
//! Studylift is a transfer tool built in Rust that reads CDISC ODM exports
//! from clinical study capture systems and delivers FHIR R4 transaction
//! bundles to a file directory, a FHIR server or an HTTP message queue.
//!
//! ## Overview
//!
//! This library provides the core functionality for:
//! - **Fetching** ODM documents from a local file, REDCap or a DIS REST endpoint
//! - **Mapping** subject data to FHIR resources via per-form mapping rules
//! - **Bundling** resources into transaction bundles with conditional requests
//! - **Tracking** per-subject content hashes for incremental runs
//!
//! ## Architecture
//!
//! Studylift follows a layered architecture:
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Business logic (mapping, bundling, state, pipeline)
//! - [`adapters`] - External integrations (ODM sources, FHIR targets)
//! - [`domain`] - ODM and FHIR domain types
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging and observability
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use studylift::config::load_config;
//! use studylift::core::pipeline::PipelineCoordinator;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("studylift.toml")?;
//!
//!     let mut coordinator = PipelineCoordinator::from_config(&config)?;
//!     let summary = coordinator.run().await?;
//!
//!     println!(
//!         "{} bundles with {} resources written",
//!         summary.bundles_written, summary.resources_written
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Incremental Runs
//!
//! With a configured cache directory Studylift persists one content hash per
//! subject plus the creation timestamp of the processed extraction. Subjects
//! whose data did not change are skipped on the next run, and windowed
//! sources restrict their export to data captured after the stored timestamp:
//!
//! ```rust,no_run
//! use studylift::core::state::ChangeTracker;
//!
//! # fn example() -> Result<(), studylift::domain::StudyliftError> {
//! let mut tracker = ChangeTracker::open(Some("./cache"))?;
//!
//! if !tracker.is_unchanged("subject-1", "content-hash") {
//!     // map and deliver, then:
//!     tracker.record("subject-1", "content-hash");
//! }
//! tracker.persist()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Studylift uses the [`domain::StudyliftError`] type for all errors:
//!
//! ```rust,no_run
//! use studylift::domain::StudyliftError;
//!
//! fn example() -> Result<(), StudyliftError> {
//!     let config = studylift::config::load_config("studylift.toml")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Logging
//!
//! Studylift uses structured logging with the `tracing` crate:
//!
//! ```rust,no_run
//! use tracing::{info, warn};
//!
//! info!("Starting transfer run");
//! warn!(subject_key = "S-001", "Empty bundle for patient");
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
