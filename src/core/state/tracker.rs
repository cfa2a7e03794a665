//! Change tracking for incremental runs
//!
//! Persists one SHA-256 content hash per subject plus the timestamp of the
//! previously processed extraction. Subjects whose hash is unchanged are
//! skipped entirely on the next run, and windowed sources use the stored
//! timestamp as the lower bound of their export window.
//!
//! Tracking is active only when a cache directory is configured; without
//! one every subject is treated as changed and nothing is persisted.

use crate::domain::errors::StudyliftError;
use crate::domain::result::Result;
use std::collections::HashMap;
use std::fs;
use chrono::{DateTime, NaiveDateTime};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const HASHES_FILE: &str = "subject-odm-hashes";
const PREVIOUS_RUN_FILE: &str = "previous-run-date-time";

/// Tracks per-subject content hashes across runs
#[derive(Debug)]
pub struct ChangeTracker {
    cache_dir: Option<PathBuf>,
    hashes: HashMap<String, String>,
    previous_run: Option<String>,
    next_run: Option<String>,
}

impl ChangeTracker {
    /// Open the tracker, loading persisted state when a cache directory
    /// is configured
    ///
    /// # Errors
    ///
    /// Returns an error when persisted state exists but cannot be read
    /// or parsed.
    pub fn open(cache_dir: Option<&str>) -> Result<Self> {
        let Some(dir) = cache_dir else {
            debug!("No cache directory configured, change tracking disabled");
            return Ok(Self::disabled());
        };

        let dir = PathBuf::from(dir);
        let hashes = load_hashes(&dir.join(HASHES_FILE))?;
        let previous_run = load_timestamp(&dir.join(PREVIOUS_RUN_FILE))?;

        info!(
            cache_dir = %dir.display(),
            tracked_subjects = hashes.len(),
            previous_run = previous_run.as_deref().unwrap_or("none"),
            "Change tracking enabled"
        );

        Ok(Self {
            cache_dir: Some(dir),
            hashes,
            previous_run,
            next_run: None,
        })
    }

    fn disabled() -> Self {
        Self {
            cache_dir: None,
            hashes: HashMap::new(),
            previous_run: None,
            next_run: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.cache_dir.is_some()
    }

    /// Number of subjects with a persisted content hash
    pub fn tracked_subjects(&self) -> usize {
        self.hashes.len()
    }

    /// Timestamp of the previously processed extraction, used as the
    /// lower bound for windowed source exports
    pub fn previous_run_date_time(&self) -> Option<&str> {
        self.previous_run.as_deref()
    }

    /// Remember the declared creation time of the current extraction; it
    /// becomes the previous-run timestamp once the run is persisted
    pub fn observe_creation_date_time(&mut self, creation_date_time: &str) {
        if !is_odm_date_time(creation_date_time) {
            warn!(
                creation_date_time = %creation_date_time,
                "ODM creation time is not an ISO 8601 timestamp"
            );
        }
        if self.next_run.is_none() {
            self.next_run = Some(creation_date_time.to_string());
        }
    }

    /// True when the subject's content hash matches the persisted one.
    /// Always false while tracking is disabled.
    pub fn is_unchanged(&self, subject_key: &str, content_hash: &str) -> bool {
        self.cache_dir.is_some()
            && self
                .hashes
                .get(subject_key)
                .is_some_and(|known| known == content_hash)
    }

    /// Record the hash of a successfully delivered subject
    pub fn record(&mut self, subject_key: &str, content_hash: &str) {
        if self.cache_dir.is_some() {
            self.hashes
                .insert(subject_key.to_string(), content_hash.to_string());
        }
    }

    /// Persist all recorded hashes and the run timestamp in one batch
    ///
    /// # Errors
    ///
    /// Returns an error when the cache directory cannot be created or
    /// written to.
    pub fn persist(&mut self) -> Result<()> {
        let Some(dir) = &self.cache_dir else {
            return Ok(());
        };

        fs::create_dir_all(dir).map_err(|e| {
            StudyliftError::State(format!(
                "Failed to create cache directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        let json = serde_json::to_string_pretty(&self.hashes)
            .map_err(|e| StudyliftError::State(format!("Failed to serialize hashes: {e}")))?;
        write_atomic(&dir.join(HASHES_FILE), &json)?;

        if let Some(next_run) = self.next_run.take() {
            write_atomic(&dir.join(PREVIOUS_RUN_FILE), &next_run)?;
            self.previous_run = Some(next_run);
        }

        debug!(tracked_subjects = self.hashes.len(), "Persisted change tracking state");
        Ok(())
    }
}

/// ODM declares ISO 8601 creation times, with or without a zone offset
fn is_odm_date_time(value: &str) -> bool {
    DateTime::parse_from_rfc3339(value).is_ok()
        || NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
}

fn load_hashes(path: &Path) -> Result<HashMap<String, String>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let contents = fs::read_to_string(path).map_err(|e| {
        StudyliftError::State(format!("Failed to read {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&contents)
        .map_err(|e| StudyliftError::State(format!("Corrupt hash cache {}: {}", path.display(), e)))
}

fn load_timestamp(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path).map_err(|e| {
        StudyliftError::State(format!("Failed to read {}: {}", path.display(), e))
    })?;
    let trimmed = contents.trim();
    Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
}

/// Write via a temp file and rename, so a crash never leaves a truncated
/// state file behind
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let temp = path.with_extension("tmp");
    fs::write(&temp, contents).map_err(|e| {
        StudyliftError::State(format!("Failed to write {}: {}", temp.display(), e))
    })?;
    fs::rename(&temp, path).map_err(|e| {
        StudyliftError::State(format!("Failed to replace {}: {}", path.display(), e))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_disabled_tracker_treats_everything_as_changed() {
        let mut tracker = ChangeTracker::open(None).unwrap();
        assert!(!tracker.is_enabled());

        tracker.record("S1", "hash1");
        assert!(!tracker.is_unchanged("S1", "hash1"));
        assert!(tracker.persist().is_ok());
    }

    #[test]
    fn test_hashes_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let cache_dir = dir.path().to_str().unwrap().to_string();

        let mut tracker = ChangeTracker::open(Some(&cache_dir)).unwrap();
        assert!(!tracker.is_unchanged("S1", "hash1"));
        tracker.record("S1", "hash1");
        tracker.record("S2", "hash2");
        tracker.persist().unwrap();

        let tracker = ChangeTracker::open(Some(&cache_dir)).unwrap();
        assert!(tracker.is_unchanged("S1", "hash1"));
        assert!(tracker.is_unchanged("S2", "hash2"));
        assert!(!tracker.is_unchanged("S1", "different"));
        assert!(!tracker.is_unchanged("S3", "hash3"));
    }

    #[test]
    fn test_creation_date_time_becomes_previous_run() {
        let dir = TempDir::new().unwrap();
        let cache_dir = dir.path().to_str().unwrap().to_string();

        let mut tracker = ChangeTracker::open(Some(&cache_dir)).unwrap();
        assert!(tracker.previous_run_date_time().is_none());

        tracker.observe_creation_date_time("2024-03-01T12:00:00");
        // only the first document's timestamp counts
        tracker.observe_creation_date_time("2024-03-02T12:00:00");
        tracker.persist().unwrap();

        let tracker = ChangeTracker::open(Some(&cache_dir)).unwrap();
        assert_eq!(
            tracker.previous_run_date_time(),
            Some("2024-03-01T12:00:00")
        );
    }

    #[test]
    fn test_unpersisted_state_is_not_visible_to_next_run() {
        let dir = TempDir::new().unwrap();
        let cache_dir = dir.path().to_str().unwrap().to_string();

        let mut tracker = ChangeTracker::open(Some(&cache_dir)).unwrap();
        tracker.record("S1", "hash1");
        drop(tracker);

        let tracker = ChangeTracker::open(Some(&cache_dir)).unwrap();
        assert!(!tracker.is_unchanged("S1", "hash1"));
    }

    #[test]
    fn test_odm_date_time_formats() {
        assert!(is_odm_date_time("2024-03-01T12:00:00"));
        assert!(is_odm_date_time("2024-03-01T12:00:00.123"));
        assert!(is_odm_date_time("2024-03-01T12:00:00+02:00"));
        assert!(!is_odm_date_time("yesterday"));
    }

    #[test]
    fn test_corrupt_cache_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(HASHES_FILE), "not json").unwrap();

        let result = ChangeTracker::open(Some(dir.path().to_str().unwrap()));
        assert!(result.is_err());
    }
}
