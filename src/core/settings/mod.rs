//! Indexer Settings
//!
//! Persistent configuration for the pipeline, search engine, job system, and
//! locking. Settings load permissively: a missing file yields defaults and a
//! corrupt file logs a warning and yields defaults, so a bad edit never
//! blocks indexing.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::fs::atomic_write_json_pretty;
use crate::core::fs::lock::LockConfig;
use crate::core::jobs::{BackoffPolicy, JobOptions, WorkerConfig};
use crate::core::search::SearchConfig;
use crate::core::CoreResult;

/// Current settings schema version
pub const SETTINGS_VERSION: u32 = 1;

/// Settings file name
pub const SETTINGS_FILE: &str = "settings.json";

// =============================================================================
// Sections
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineSettings {
    /// Scene texts embedded per provider call
    pub embedding_batch_size: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            embedding_batch_size: 16,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchSettings {
    pub candidate_multiplier: usize,
    pub min_candidate_pool: usize,
    pub default_limit: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            candidate_multiplier: 5,
            min_candidate_pool: 50,
            default_limit: 20,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobSettings {
    pub num_workers: usize,
    pub poll_interval_ms: u64,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for JobSettings {
    fn default() -> Self {
        let workers = WorkerConfig::default();
        Self {
            num_workers: workers.num_workers,
            poll_interval_ms: workers.poll_interval_ms,
            max_attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LockSettings {
    pub poll_interval_ms: u64,
    pub warn_after_ms: u64,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 25,
            warn_after_ms: 5000,
        }
    }
}

// =============================================================================
// Settings
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IndexerSettings {
    pub version: u32,
    pub pipeline: PipelineSettings,
    pub search: SearchSettings,
    pub jobs: JobSettings,
    pub locking: LockSettings,
}

impl Default for IndexerSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            pipeline: PipelineSettings::default(),
            search: SearchSettings::default(),
            jobs: JobSettings::default(),
            locking: LockSettings::default(),
        }
    }
}

impl IndexerSettings {
    /// Default settings path under the platform data directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_local_dir().map(|d| d.join("scenedex").join(SETTINGS_FILE))
    }

    /// Loads settings; missing or unreadable files yield defaults.
    pub fn load(path: &Path) -> Self {
        if !path.is_file() {
            return Self::default();
        }
        match std::fs::read(path).map_err(|e| e.to_string()).and_then(|b| {
            serde_json::from_slice::<IndexerSettings>(&b).map_err(|e| e.to_string())
        }) {
            Ok(settings) => {
                let settings = settings.normalize();
                info!(path = %path.display(), "loaded settings");
                settings
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load settings, using defaults");
                Self::default()
            }
        }
    }

    /// Persists settings atomically
    pub fn save(&self, path: &Path) -> CoreResult<()> {
        atomic_write_json_pretty(path, self)
    }

    /// Clamps out-of-range values back to sane minimums
    pub fn normalize(mut self) -> Self {
        self.version = SETTINGS_VERSION;
        self.pipeline.embedding_batch_size = self.pipeline.embedding_batch_size.max(1);
        self.search.candidate_multiplier = self.search.candidate_multiplier.max(1);
        self.search.min_candidate_pool = self.search.min_candidate_pool.max(1);
        self.search.default_limit = self.search.default_limit.max(1);
        self.jobs.num_workers = self.jobs.num_workers.clamp(1, 32);
        self.jobs.poll_interval_ms = self.jobs.poll_interval_ms.max(10);
        self.jobs.max_attempts = self.jobs.max_attempts.max(1);
        self.jobs.base_delay_ms = self.jobs.base_delay_ms.max(1);
        self.locking.poll_interval_ms = self.locking.poll_interval_ms.max(1);
        self.locking.warn_after_ms = self.locking.warn_after_ms.max(100);
        self
    }

    // =========================================================================
    // Conversions
    // =========================================================================

    pub fn search_config(&self) -> SearchConfig {
        SearchConfig {
            candidate_multiplier: self.search.candidate_multiplier,
            min_candidate_pool: self.search.min_candidate_pool,
            default_limit: self.search.default_limit,
        }
    }

    pub fn lock_config(&self) -> LockConfig {
        LockConfig {
            poll_interval: Duration::from_millis(self.locking.poll_interval_ms),
            warn_after: Duration::from_millis(self.locking.warn_after_ms),
        }
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            num_workers: self.jobs.num_workers,
            poll_interval_ms: self.jobs.poll_interval_ms,
        }
    }

    pub fn job_options(&self) -> JobOptions {
        JobOptions {
            max_attempts: self.jobs.max_attempts,
            backoff: BackoffPolicy::Exponential {
                base_delay_ms: self.jobs.base_delay_ms,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = IndexerSettings::load(&dir.path().join("settings.json"));
        assert_eq!(settings, IndexerSettings::default());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");

        let mut settings = IndexerSettings::default();
        settings.search.default_limit = 7;
        settings.jobs.num_workers = 3;
        settings.save(&path).unwrap();

        let loaded = IndexerSettings::load(&path);
        assert_eq!(loaded.search.default_limit, 7);
        assert_eq!(loaded.jobs.num_workers, 3);
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, b"{ nope").unwrap();

        let settings = IndexerSettings::load(&path);
        assert_eq!(settings, IndexerSettings::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, br#"{"search": {"defaultLimit": 9}}"#).unwrap();

        let settings = IndexerSettings::load(&path);
        assert_eq!(settings.search.default_limit, 9);
        assert_eq!(settings.jobs.max_attempts, 3);
    }

    #[test]
    fn test_normalize_clamps_zeroes() {
        let mut settings = IndexerSettings::default();
        settings.search.default_limit = 0;
        settings.jobs.num_workers = 0;
        settings.locking.poll_interval_ms = 0;

        let normalized = settings.normalize();
        assert_eq!(normalized.search.default_limit, 1);
        assert_eq!(normalized.jobs.num_workers, 1);
        assert_eq!(normalized.locking.poll_interval_ms, 1);
    }
}
