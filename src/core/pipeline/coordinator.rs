//! Pipeline coordinator - main orchestrator for a transfer run
//!
//! This module coordinates the entire workflow, managing the interaction
//! between the ODM source, change tracking, mapping, bundling and delivery.

use crate::adapters::odm::{create_source, OdmSource};
use crate::adapters::sink::{create_sink, BundleSink};
use crate::config::StudyliftConfig;
use crate::core::bundle::Bundler;
use crate::core::mapping::MappingEngine;
use crate::core::pipeline::summary::RunSummary;
use crate::core::state::ChangeTracker;
use crate::domain::Result;
use std::time::Instant;

/// Pipeline coordinator
pub struct PipelineCoordinator {
    source: Box<dyn OdmSource>,
    sink: Box<dyn BundleSink>,
    engine: MappingEngine,
    bundler: Bundler,
    tracker: ChangeTracker,
}

impl PipelineCoordinator {
    /// Create a coordinator from validated configuration
    pub fn from_config(config: &StudyliftConfig) -> Result<Self> {
        let source = create_source(&config.odm)?;
        let sink = create_sink(&config.fhir)?;
        let engine = MappingEngine::new(config.mapping.clone());
        let bundler = Bundler::new(&config.fhir);
        let tracker = ChangeTracker::open(config.state.cache_dir.as_deref())?;

        Ok(Self {
            source,
            sink,
            engine,
            bundler,
            tracker,
        })
    }

    /// Create a coordinator from pre-built parts
    pub fn new(
        source: Box<dyn OdmSource>,
        sink: Box<dyn BundleSink>,
        engine: MappingEngine,
        bundler: Bundler,
        tracker: ChangeTracker,
    ) -> Self {
        Self {
            source,
            sink,
            engine,
            bundler,
            tracker,
        }
    }

    /// Execute one transfer run
    ///
    /// Fetches ODM documents from the source, maps each changed subject to a
    /// transaction bundle and delivers it to the sink. Unchanged subjects are
    /// skipped via the change tracker; a mapping failure aborts only the
    /// affected subject, while source and sink failures abort the run.
    pub async fn run(&mut self) -> Result<RunSummary> {
        let start_time = Instant::now();
        let mut summary = RunSummary::new();

        tracing::info!(
            source = self.source.name(),
            sink = self.sink.name(),
            incremental = self.tracker.is_enabled(),
            "Starting transfer run"
        );

        let window_start = self.tracker.previous_run_date_time().map(str::to_owned);
        let documents = self.source.fetch(window_start.as_deref()).await?;

        tracing::info!(document_count = documents.len(), "Fetched ODM documents");

        for odm in &documents {
            if let Some(creation) = &odm.creation_date_time {
                self.tracker.observe_creation_date_time(creation);
            }

            for subject in odm.subjects() {
                summary.subjects_seen += 1;
                self.process_subject(subject, &mut summary).await?;
            }
        }

        self.tracker.persist()?;

        tracing::info!(
            duration_secs = start_time.elapsed().as_secs(),
            "Transfer run finished"
        );
        summary.log_summary();

        Ok(summary)
    }

    async fn process_subject(
        &mut self,
        subject: &crate::domain::odm::SubjectData,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let subject_key = subject.subject_key.trim();
        if subject_key.is_empty() {
            tracing::warn!("Subject without subject key skipped");
            return Ok(());
        }

        let content_hash = subject.content_hash();
        if self.tracker.is_unchanged(subject_key, &content_hash) {
            tracing::debug!(subject_key = %subject_key, "Subject unchanged, skipping");
            summary.subjects_unchanged += 1;
            return Ok(());
        }

        let resources = match self.engine.map_subject(subject) {
            Ok(resources) => resources,
            Err(e) => {
                tracing::error!(
                    subject_key = %subject_key,
                    error = %e,
                    "Failed to map subject"
                );
                summary.subjects_failed += 1;
                return Ok(());
            }
        };

        let bundle = self.bundler.bundle(resources);
        if bundle.is_empty() {
            tracing::warn!("Empty bundle for patient '{}'", subject_key);
            summary.bundles_empty += 1;
            return Ok(());
        }

        let resource_count = bundle.resource_count();
        self.sink.deliver(&bundle).await?;

        self.tracker.record(subject_key, &content_hash);
        summary.bundles_written += 1;
        summary.resources_written += resource_count;

        tracing::debug!(
            subject_key = %subject_key,
            resources = resource_count,
            "Bundle delivered"
        );

        Ok(())
    }
}
