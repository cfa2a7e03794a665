//! Run summary and reporting
//!
//! Tracks per-run counters and produces the closing log line.

/// Summary of a pipeline run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Number of subjects found in the fetched documents
    pub subjects_seen: usize,

    /// Subjects skipped because their content hash matched the previous run
    pub subjects_unchanged: usize,

    /// Subjects whose bundle contained no resources
    pub bundles_empty: usize,

    /// Subjects that failed during mapping
    pub subjects_failed: usize,

    /// Bundles successfully delivered
    pub bundles_written: usize,

    /// Resources contained in the delivered bundles
    pub resources_written: usize,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether the run completed without per-subject failures
    pub fn is_successful(&self) -> bool {
        self.subjects_failed == 0
    }

    /// Log the summary
    pub fn log_summary(&self) {
        tracing::info!(
            subjects = self.subjects_seen,
            unchanged = self.subjects_unchanged,
            empty = self.bundles_empty,
            failed = self.subjects_failed,
            "{} bundles with {} resources written",
            self.bundles_written,
            self.resources_written
        );

        if self.subjects_failed > 0 {
            tracing::warn!(
                failed = self.subjects_failed,
                "Run completed with subject failures"
            );
        }
    }
}
